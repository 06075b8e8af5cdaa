#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Notify;
use url::Url;

use prep_core::model::{
    Course, CurriculumNode, ProgressScope, Question, Standard, Test, UserId,
};
use prep_core::time::fixed_clock;
use services::{
    ProgressBus, RemoteError, RemoteProgress, RemoteSnapshot, SaveProgress, SyncConfig,
    SyncContext, SyncController,
};
use storage::{InMemoryRepository, ProgressCache};

/// In-process stand-in for the progress service.
#[derive(Default)]
pub struct FakeRemote {
    pub stored: Mutex<RemoteSnapshot>,
    pub saves: Mutex<Vec<SaveProgress>>,
    pub deletes: Mutex<Vec<ProgressScope>>,
    pub fail_fetch: AtomicBool,
    /// Number of upcoming saves to reject.
    pub failing_saves: AtomicU32,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeRemote {
    /// Hold every fetch until the returned `Notify` fires.
    pub fn gate_fetches(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn last_save(&self) -> SaveProgress {
        self.saves.lock().unwrap().last().cloned().expect("a save")
    }
}

#[async_trait]
impl RemoteProgress for FakeRemote {
    async fn fetch(
        &self,
        _user: &UserId,
        _course: Course,
        _standard: Standard,
    ) -> Result<RemoteSnapshot, RemoteError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::HttpStatus(StatusCode::BAD_GATEWAY));
        }
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn save(&self, request: &SaveProgress) -> Result<(), RemoteError> {
        let failing = self.failing_saves.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_saves.store(failing - 1, Ordering::SeqCst);
            return Err(RemoteError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE));
        }
        {
            let mut stored = self.stored.lock().unwrap();
            stored.completed_subtopics = request.completed_subtopics.clone();
            stored.subject_completion = request.subject_completion.clone();
        }
        self.saves.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn delete(&self, _user: &UserId, scope: &ProgressScope) -> Result<(), RemoteError> {
        self.stored
            .lock()
            .unwrap()
            .completed_subtopics
            .clear_scope(scope);
        self.deletes.lock().unwrap().push(scope.clone());
        Ok(())
    }
}

pub fn user() -> UserId {
    UserId::new("student-7").unwrap()
}

pub fn scope() -> ProgressScope {
    ProgressScope::new(Course::Neet, Standard::Eleventh, "Biology")
}

pub fn question() -> Question {
    Question {
        question: "Powerhouse of the cell?".into(),
        option1: Some("Nucleus".into()),
        option2: Some("Mitochondria".into()),
        correct_index: Some(1),
        ..Question::default()
    }
}

/// Unit 1: L1, L2, L3. Unit 2: M1 plus a topic test.
pub fn topics() -> Vec<CurriculumNode> {
    vec![
        CurriculumNode::branch(
            "Unit 1",
            vec![
                CurriculumNode::lesson("L1"),
                CurriculumNode::lesson("L2"),
                CurriculumNode::lesson("L3"),
            ],
        ),
        CurriculumNode::branch("Unit 2", vec![CurriculumNode::lesson("M1")])
            .with_test(Test::new("Unit 2 Test", vec![question(), question()])),
    ]
}

pub fn config() -> SyncConfig {
    let mut config = SyncConfig::new(Url::parse("http://localhost:5000").unwrap());
    config.retry_backoff = Duration::from_millis(10);
    config
}

pub struct Harness {
    pub controller: SyncController,
    pub ctx: SyncContext,
    pub remote: Arc<FakeRemote>,
    pub repo: InMemoryRepository,
    pub cache: ProgressCache,
}

impl Harness {
    /// Another controller on the same context, for a sibling subject.
    pub fn controller_for(&self, subject: &str, topics: Vec<CurriculumNode>) -> SyncController {
        let scope = ProgressScope::new(Course::Neet, Standard::Eleventh, subject);
        SyncController::new(user(), scope, topics, self.ctx.clone())
    }
}

pub fn harness_with(topics: Vec<CurriculumNode>, remote: Arc<FakeRemote>) -> Harness {
    let repo = InMemoryRepository::new();
    let cache = ProgressCache::new(Arc::new(repo.clone()));
    let ctx = SyncContext::new(
        fixed_clock(),
        cache.clone(),
        Arc::clone(&remote) as Arc<dyn RemoteProgress>,
        config(),
        ProgressBus::new(),
    );
    Harness {
        controller: SyncController::new(user(), scope(), topics, ctx.clone()),
        ctx,
        remote,
        repo,
        cache,
    }
}

pub fn harness() -> Harness {
    harness_with(topics(), Arc::new(FakeRemote::default()))
}
