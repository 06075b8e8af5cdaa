use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use prep_core::Clock;
use prep_core::model::{
    CompletedSubtopics, Course, CurriculumNode, ProgressScope, Standard, SubjectCompletions,
    UserId,
};
use prep_core::percent::{calculate_subject_progress, is_subject_complete, topic_percentages};
use prep_core::unlock::UnlockEvaluator;
use storage::ProgressCache;
use storage::repository::StorageError;
use tokio::sync::broadcast;

use super::events::{ProgressBus, ProgressEvent};
use crate::config::SyncConfig;
use crate::debounce::DebounceTimer;
use crate::error::{RemoteError, SyncError};
use crate::remote::{RemoteProgress, SaveProgress};
use crate::retry::RetryPolicy;

/// Lifecycle of the in-memory progress map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Loading,
    Ready,
}

/// How a `load` settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Local and remote state were merged.
    Synced,
    /// The remote fetch failed; local data is in use.
    LocalOnly,
    /// A newer load, reset or navigation superseded this one.
    Stale,
}

/// Collaborators shared by every controller of a process.
#[derive(Clone)]
pub struct SyncContext {
    pub clock: Clock,
    pub cache: ProgressCache,
    pub remote: Arc<dyn RemoteProgress>,
    pub config: SyncConfig,
    pub bus: ProgressBus,
    stores: StoreRegistry,
}

impl SyncContext {
    #[must_use]
    pub fn new(
        clock: Clock,
        cache: ProgressCache,
        remote: Arc<dyn RemoteProgress>,
        config: SyncConfig,
        bus: ProgressBus,
    ) -> Self {
        Self {
            clock,
            cache,
            remote,
            config,
            bus,
            stores: StoreRegistry::default(),
        }
    }
}

type StoreKey = (UserId, Course, Standard);

/// Hands out one `ScopeStore` per (user, course, standard).
///
/// The device cache and the remote store each keep that progress map as a
/// single record, so the controllers of all its subjects must write the
/// same in-memory copy.
#[derive(Clone, Default)]
struct StoreRegistry {
    stores: Arc<Mutex<HashMap<StoreKey, Weak<ScopeStore>>>>,
}

impl StoreRegistry {
    fn open(&self, user: &UserId, course: Course, standard: Standard) -> Arc<ScopeStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.retain(|_, store| store.strong_count() > 0);
        let key = (user.clone(), course, standard);
        if let Some(store) = stores.get(&key).and_then(Weak::upgrade) {
            return store;
        }
        let store = Arc::new(ScopeStore::new(user.clone(), course, standard));
        stores.insert(key, Arc::downgrade(&store));
        store
    }
}

struct SyncState {
    /// Bumped by every reset so loads started earlier are dropped.
    epoch: u64,
    store: CompletedSubtopics,
    subjects: SubjectCompletions,
    /// Memory holds changes the remote store has not acknowledged.
    dirty: bool,
}

/// Progress of one user in one (course, standard), shared by its subjects.
struct ScopeStore {
    user: UserId,
    course: Course,
    standard: Standard,
    state: Mutex<SyncState>,
    debounce: Mutex<DebounceTimer>,
    // Serializes remote writes and deletes so they land in call order.
    write_lock: tokio::sync::Mutex<()>,
    // Serializes device cache writes. Snapshots are taken while it is held,
    // so the newest state is always written last.
    cache_lock: tokio::sync::Mutex<()>,
}

impl ScopeStore {
    fn new(user: UserId, course: Course, standard: Standard) -> Self {
        Self {
            user,
            course,
            standard,
            state: Mutex::new(SyncState {
                epoch: 0,
                store: CompletedSubtopics::new(),
                subjects: SubjectCompletions::new(),
                dirty: false,
            }),
            debounce: Mutex::new(DebounceTimer::new()),
            write_lock: tokio::sync::Mutex::new(()),
            cache_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn debounce(&self) -> MutexGuard<'_, DebounceTimer> {
        self.debounce.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push the cumulative state to the remote store, retrying with backoff.
    async fn persist_remote(&self, ctx: &SyncContext) -> Result<(), RemoteError> {
        let _writing = self.write_lock.lock().await;
        let request = {
            let mut state = self.state();
            if !state.dirty {
                return Ok(());
            }
            state.dirty = false;
            SaveProgress {
                user: self.user.clone(),
                course: self.course,
                standard: self.standard,
                completed_subtopics: state.store.clone(),
                subject_completion: state.subjects.clone(),
            }
        };

        let policy = RetryPolicy::new(ctx.config.write_retries, ctx.config.retry_backoff);
        match policy
            .run("save progress", || ctx.remote.save(&request))
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    course = %self.course,
                    standard = %self.standard,
                    topics = request.completed_subtopics.len(),
                    "progress saved remotely"
                );
                Ok(())
            }
            Err(err) => {
                self.state().dirty = true;
                tracing::warn!(
                    course = %self.course,
                    standard = %self.standard,
                    error = %err,
                    "remote save failed, keeping local copy"
                );
                Err(err)
            }
        }
    }

    /// Write the current progress map, and the certifications when
    /// `with_subjects`, to the device cache.
    async fn write_cache(&self, ctx: &SyncContext, with_subjects: bool) -> Result<(), StorageError> {
        let _caching = self.cache_lock.lock().await;
        let (store, subjects) = {
            let state = self.state();
            (state.store.clone(), with_subjects.then(|| state.subjects.clone()))
        };
        ctx.cache
            .save_subtopics(&self.user, self.course, self.standard, &store)
            .await?;
        if let Some(subjects) = subjects {
            ctx.cache
                .save_subject_completion(self.course, self.standard, &subjects)
                .await?;
        }
        Ok(())
    }
}

/// Per-controller load bookkeeping.
struct View {
    phase: SyncPhase,
    generation: u64,
}

struct Shared {
    scope: ProgressScope,
    topics: Arc<[CurriculumNode]>,
    ctx: SyncContext,
    view: Mutex<View>,
    store: Arc<ScopeStore>,
}

/// Progress of one user in one subject.
///
/// Cheap to clone; clones share state. Controllers for other subjects of the
/// same course and standard, built from the same `SyncContext`, share the
/// progress map too. Once every such controller is dropped, a write still
/// waiting out its debounce is cancelled, so call `leave` first.
#[derive(Clone)]
pub struct SyncController {
    shared: Arc<Shared>,
}

impl SyncController {
    #[must_use]
    pub fn new(
        user: UserId,
        scope: ProgressScope,
        topics: impl Into<Arc<[CurriculumNode]>>,
        ctx: SyncContext,
    ) -> Self {
        let store = ctx.stores.open(&user, scope.course, scope.standard);
        Self {
            shared: Arc::new(Shared {
                scope,
                topics: topics.into(),
                ctx,
                view: Mutex::new(View {
                    phase: SyncPhase::Uninitialized,
                    generation: 0,
                }),
                store,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.shared.store.state()
    }

    fn view(&self) -> MutexGuard<'_, View> {
        self.shared
            .view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.shared.store.user
    }

    #[must_use]
    pub fn scope(&self) -> &ProgressScope {
        &self.shared.scope
    }

    #[must_use]
    pub fn topics(&self) -> &[CurriculumNode] {
        &self.shared.topics
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.view().phase
    }

    /// True if a load begun at `generation` and `epoch` was overtaken by a
    /// newer load, `leave` or reset. A reset leaves memory coherent, so the
    /// phase still settles.
    fn superseded(&self, state: &SyncState, generation: u64, epoch: u64) -> bool {
        let mut view = self.view();
        if view.generation != generation {
            return true;
        }
        if state.epoch != epoch {
            view.phase = SyncPhase::Ready;
            return true;
        }
        false
    }

    /// Bring memory up to date: device cache first, then the remote store.
    ///
    /// Both sources are unioned into whatever is already in memory, so a
    /// completion made while the fetch is in flight survives. The phase
    /// reaches `Ready` whether or not the fetch succeeds.
    pub async fn load(&self) -> LoadOutcome {
        let shared = &self.shared;
        let store = &shared.store;
        let (course, standard) = (shared.scope.course, shared.scope.standard);
        let epoch = self.state().epoch;
        let generation = {
            let mut view = self.view();
            view.generation += 1;
            view.phase = SyncPhase::Loading;
            view.generation
        };

        let local = match shared
            .ctx
            .cache
            .load_subtopics(&store.user, course, standard)
            .await
        {
            Ok(local) => local,
            Err(err) => {
                tracing::warn!(scope = %shared.scope, error = %err, "cached progress unreadable");
                CompletedSubtopics::new()
            }
        };
        let local_subjects = match shared
            .ctx
            .cache
            .load_subject_completion(course, standard)
            .await
        {
            Ok(subjects) => subjects,
            Err(err) => {
                tracing::warn!(scope = %shared.scope, error = %err, "cached certifications unreadable");
                SubjectCompletions::new()
            }
        };
        {
            let mut state = self.state();
            if self.superseded(&state, generation, epoch) {
                tracing::debug!(scope = %shared.scope, generation, "dropping stale local load");
                return LoadOutcome::Stale;
            }
            state.store.merge(&local);
            state.subjects.merge(&local_subjects);
        }

        let fetched = shared.ctx.remote.fetch(&store.user, course, standard).await;

        let (outcome, topic_count, certified, behind) = {
            let mut state = self.state();
            if self.superseded(&state, generation, epoch) {
                tracing::debug!(scope = %shared.scope, generation, "dropping stale remote load");
                return LoadOutcome::Stale;
            }
            let (outcome, behind) = match fetched {
                Ok(snapshot) => {
                    state.store.merge(&snapshot.completed_subtopics);
                    state.subjects.merge(&snapshot.subject_completion);
                    // Anything remote still lacks was completed offline or
                    // lost by a failed write.
                    let mut remote_view = snapshot.completed_subtopics;
                    let behind = remote_view.merge(&state.store).new_leaves > 0;
                    (LoadOutcome::Synced, behind)
                }
                Err(err) => {
                    tracing::warn!(scope = %shared.scope, error = %err, "remote progress unavailable, using local copy");
                    (LoadOutcome::LocalOnly, false)
                }
            };
            let certified = self.certify_if_complete(&mut state);
            state.dirty |= behind || certified;
            self.view().phase = SyncPhase::Ready;
            (outcome, state.store.len(), certified, behind)
        };

        if let Err(err) = store.write_cache(&shared.ctx, certified).await {
            tracing::warn!(scope = %shared.scope, error = %err, "failed to cache merged progress");
        }
        if certified {
            shared.ctx.bus.emit(ProgressEvent::SubjectCertified {
                scope: shared.scope.clone(),
            });
        }
        if (behind || certified) && outcome == LoadOutcome::Synced {
            self.schedule_persist();
        }

        tracing::info!(scope = %shared.scope, ?outcome, topics = topic_count, "progress loaded");
        shared.ctx.bus.emit(ProgressEvent::Loaded {
            user: store.user.clone(),
            scope: shared.scope.clone(),
            remote_ok: outcome == LoadOutcome::Synced,
        });
        outcome
    }

    /// Certify the subject when every topic is at 100%. Returns whether the
    /// certification is new.
    fn certify_if_complete(&self, state: &mut SyncState) -> bool {
        let shared = &self.shared;
        is_subject_complete(&shared.topics, &shared.scope, &state.store)
            && state.subjects.certify(&shared.scope.subject)
    }

    /// Record `leaf` of topic `topic_index` as complete.
    ///
    /// Memory changes synchronously, the device cache is written before
    /// returning and the remote write is debounced. Marking an already
    /// complete leaf changes nothing and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownTopic` for a bad index, or
    /// `SyncError::Storage` if the device cache cannot be written. The
    /// in-memory change and the scheduled remote write stand either way.
    pub async fn mark_leaf_complete(
        &self,
        topic_index: usize,
        leaf: &str,
    ) -> Result<bool, SyncError> {
        let shared = &self.shared;
        let topic = shared
            .topics
            .get(topic_index)
            .ok_or(SyncError::UnknownTopic {
                index: topic_index,
                len: shared.topics.len(),
            })?;
        let key = shared.scope.key_for(topic);
        let at = shared.ctx.clock.now();

        let certified = {
            let mut state = self.state();
            if !state.store.mark_leaf_complete(key.clone(), leaf, at) {
                return Ok(false);
            }
            let certified = self.certify_if_complete(&mut state);
            state.dirty = true;
            certified
        };
        tracing::debug!(key = %key, leaf, "leaf completed");

        self.schedule_persist();
        shared.ctx.bus.emit(ProgressEvent::LeafCompleted {
            user: shared.store.user.clone(),
            key,
            leaf: leaf.to_string(),
        });
        if certified {
            tracing::info!(scope = %shared.scope, "subject certified");
            shared.ctx.bus.emit(ProgressEvent::SubjectCertified {
                scope: shared.scope.clone(),
            });
        }

        shared.store.write_cache(&shared.ctx, certified).await?;
        Ok(true)
    }

    fn schedule_persist(&self) {
        let weak: Weak<ScopeStore> = Arc::downgrade(&self.shared.store);
        let ctx = self.shared.ctx.clone();
        let delay = ctx.config.debounce;
        self.shared.store.debounce().schedule(delay, async move {
            if let Some(store) = weak.upgrade() {
                // Failures are logged and leave the state dirty.
                let _ = store.persist_remote(&ctx).await;
            }
        });
    }

    /// True while a remote write is waiting out its debounce.
    #[must_use]
    pub fn is_write_pending(&self) -> bool {
        self.shared.store.debounce().is_pending()
    }

    /// Skip the debounce and write any unsent changes now.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the write still fails after retries.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let shared = &self.shared;
        shared.store.debounce().cancel();
        shared.store.persist_remote(&shared.ctx).await?;
        Ok(())
    }

    /// The view is going away: drop results of in-flight loads and flush.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the final write fails.
    pub async fn leave(&self) -> Result<(), SyncError> {
        self.view().generation += 1;
        self.flush().await
    }

    /// Erase the subject's progress everywhere, remote first. Other subjects
    /// of the same course and standard are kept.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the remote delete fails, in which case
    /// nothing local is touched, or `SyncError::Storage` if the device cache
    /// cannot be cleared.
    pub async fn reset(&self) -> Result<(), SyncError> {
        let shared = &self.shared;
        let store = &shared.store;
        store.debounce().cancel();

        let reschedule = {
            let _writing = store.write_lock.lock().await;
            if let Err(err) = shared.ctx.remote.delete(&store.user, &shared.scope).await {
                tracing::warn!(scope = %shared.scope, error = %err, "remote reset failed");
                if self.state().dirty {
                    self.schedule_persist();
                }
                return Err(err.into());
            }
            let mut state = self.state();
            let removed = state.store.clear_scope(&shared.scope);
            state.subjects.revoke(&shared.scope.subject);
            // Loads started before the reset would resurrect deleted data.
            state.epoch += 1;
            tracing::info!(scope = %shared.scope, removed, "progress reset");
            state.dirty
        };
        self.view().phase = SyncPhase::Ready;
        if reschedule {
            self.schedule_persist();
        }

        {
            let _caching = store.cache_lock.lock().await;
            shared.ctx.cache.clear_scope(&store.user, &shared.scope).await?;
            let mut subjects = shared
                .ctx
                .cache
                .load_subject_completion(shared.scope.course, shared.scope.standard)
                .await
                .unwrap_or_default();
            if subjects.revoke(&shared.scope.subject) {
                shared
                    .ctx
                    .cache
                    .save_subject_completion(shared.scope.course, shared.scope.standard, &subjects)
                    .await?;
            }
        }

        shared.ctx.bus.emit(ProgressEvent::Reset {
            user: store.user.clone(),
            scope: shared.scope.clone(),
        });
        Ok(())
    }

    /// Run `f` against an evaluator over the current state.
    pub fn with_evaluator<R>(&self, f: impl FnOnce(&UnlockEvaluator<'_>) -> R) -> R {
        let shared = &self.shared;
        let state = self.state();
        let evaluator = UnlockEvaluator::new(&shared.topics, &shared.scope, &state.store)
            .with_gating(shared.ctx.config.gating);
        f(&evaluator)
    }

    #[must_use]
    pub fn topic_progress(&self, topic_index: usize) -> u8 {
        self.with_evaluator(|eval| eval.topic_progress(topic_index))
    }

    #[must_use]
    pub fn topic_percentages(&self) -> Vec<u8> {
        let shared = &self.shared;
        topic_percentages(&shared.topics, &shared.scope, &self.state().store)
    }

    #[must_use]
    pub fn subject_progress(&self) -> u8 {
        let shared = &self.shared;
        calculate_subject_progress(&shared.topics, &shared.scope, &self.state().store)
    }

    #[must_use]
    pub fn is_topic_unlocked(&self, topic_index: usize) -> bool {
        self.with_evaluator(|eval| eval.is_topic_unlocked(topic_index))
    }

    #[must_use]
    pub fn is_leaf_unlocked(&self, name: &str) -> bool {
        self.with_evaluator(|eval| eval.is_leaf_unlocked(name))
    }

    #[must_use]
    pub fn is_subject_certified(&self) -> bool {
        self.state().subjects.is_certified(&self.shared.scope.subject)
    }

    /// Copy of the whole (course, standard) progress map.
    #[must_use]
    pub fn snapshot(&self) -> CompletedSubtopics {
        self.state().store.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.shared.ctx.bus.subscribe()
    }
}
