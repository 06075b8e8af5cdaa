use std::sync::Arc;

use prep_core::model::{
    CompletedSubtopics, Course, ProgressScope, Standard, SubjectCompletions, UserId,
};

use crate::keys::{completed_subtopics_key, subject_completion_key};
use crate::repository::{LocalStore, StorageError};

/// Typed access to the progress entries of a `LocalStore`.
///
/// Values are JSON; keys keep their literal dots locally.
#[derive(Clone)]
pub struct ProgressCache {
    store: Arc<dyn LocalStore>,
}

impl ProgressCache {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Load cached progress for a user's (course, standard). Missing is empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for an unreadable entry, or the
    /// backend's error.
    pub async fn load_subtopics(
        &self,
        user: &UserId,
        course: Course,
        standard: Standard,
    ) -> Result<CompletedSubtopics, StorageError> {
        let key = completed_subtopics_key(user, course, standard);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|err| StorageError::Serialization(format!("{key}: {err}"))),
            None => Ok(CompletedSubtopics::new()),
        }
    }

    /// Overwrite cached progress for a user's (course, standard).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the write fails.
    pub async fn save_subtopics(
        &self,
        user: &UserId,
        course: Course,
        standard: Standard,
        subtopics: &CompletedSubtopics,
    ) -> Result<(), StorageError> {
        let key = completed_subtopics_key(user, course, standard);
        let raw = serde_json::to_string(subtopics)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.store.put(&key, &raw).await
    }

    /// Drop every cached topic of `scope`. Returns how many topics were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be read or rewritten.
    pub async fn clear_scope(
        &self,
        user: &UserId,
        scope: &ProgressScope,
    ) -> Result<usize, StorageError> {
        let mut removed = 0;
        for standard in [Standard::Eleventh, Standard::Twelfth] {
            let key = completed_subtopics_key(user, scope.course, standard);
            if self.store.get(&key).await?.is_none() {
                continue;
            }
            let mut subtopics = self.load_subtopics(user, scope.course, standard).await?;
            let cleared = subtopics.clear_scope(scope);
            if cleared == 0 {
                continue;
            }
            removed += cleared;
            tracing::debug!(%key, cleared, "cleared cached topics");
            if subtopics.is_empty() {
                self.store.remove(&key).await?;
            } else {
                self.save_subtopics(user, scope.course, standard, &subtopics)
                    .await?;
            }
        }
        Ok(removed)
    }

    /// Load cached subject certifications. Missing is empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for an unreadable entry.
    pub async fn load_subject_completion(
        &self,
        course: Course,
        standard: Standard,
    ) -> Result<SubjectCompletions, StorageError> {
        let key = subject_completion_key(course, standard);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|err| StorageError::Serialization(format!("{key}: {err}"))),
            None => Ok(SubjectCompletions::new()),
        }
    }

    /// Overwrite cached subject certifications.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the write fails.
    pub async fn save_subject_completion(
        &self,
        course: Course,
        standard: Standard,
        subjects: &SubjectCompletions,
    ) -> Result<(), StorageError> {
        let key = subject_completion_key(course, standard);
        let raw = serde_json::to_string(subjects)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.store.put(&key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use prep_core::model::ProgressKey;
    use prep_core::time::fixed_now;

    fn user() -> UserId {
        UserId::new("student-1").unwrap()
    }

    fn cache() -> (ProgressCache, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        (ProgressCache::new(Arc::new(repo.clone())), repo)
    }

    #[tokio::test]
    async fn missing_entries_load_empty() {
        let (cache, _) = cache();
        let loaded = cache
            .load_subtopics(&user(), Course::Neet, Standard::Eleventh)
            .await
            .unwrap();
        assert!(loaded.is_empty());
        assert!(
            cache
                .load_subject_completion(Course::Neet, Standard::Eleventh)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn subtopics_round_trip_under_namespaced_key() {
        let (cache, repo) = cache();
        let mut store = CompletedSubtopics::new();
        store.mark_leaf_complete(
            ProgressKey::new(Course::Neet, Standard::Eleventh, "Biology", "Cells"),
            "Cell Wall",
            fixed_now(),
        );
        cache
            .save_subtopics(&user(), Course::Neet, Standard::Eleventh, &store)
            .await
            .unwrap();

        assert!(
            repo.get("completedSubtopics_student-1_NEET_11th")
                .await
                .unwrap()
                .is_some()
        );
        let loaded = cache
            .load_subtopics(&user(), Course::Neet, Standard::Eleventh)
            .await
            .unwrap();
        assert_eq!(loaded, store);
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_serialization_error() {
        let (cache, repo) = cache();
        repo.put("completedSubtopics_student-1_JEE_12th", "{not json")
            .await
            .unwrap();
        let err = cache
            .load_subtopics(&user(), Course::Jee, Standard::Twelfth)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn clear_scope_keeps_other_subjects() {
        let (cache, repo) = cache();
        let mut store = CompletedSubtopics::new();
        store.mark_leaf_complete(
            ProgressKey::new(Course::Neet, Standard::Eleventh, "Biology", "Cells"),
            "A",
            fixed_now(),
        );
        store.mark_leaf_complete(
            ProgressKey::new(Course::Neet, Standard::Eleventh, "Physics", "Motion"),
            "B",
            fixed_now(),
        );
        cache
            .save_subtopics(&user(), Course::Neet, Standard::Eleventh, &store)
            .await
            .unwrap();

        let scope = ProgressScope::new(Course::Neet, Standard::Eleventh, "Biology");
        assert_eq!(cache.clear_scope(&user(), &scope).await.unwrap(), 1);
        let left = cache
            .load_subtopics(&user(), Course::Neet, Standard::Eleventh)
            .await
            .unwrap();
        assert_eq!(left.len(), 1);

        let physics = ProgressScope::new(Course::Neet, Standard::Eleventh, "Physics");
        assert_eq!(cache.clear_scope(&user(), &physics).await.unwrap(), 1);
        assert_eq!(
            repo.get("completedSubtopics_student-1_NEET_11th").await.unwrap(),
            None
        );
    }
}
