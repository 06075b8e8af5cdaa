//! Clients for the progress and content HTTP services.

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use prep_core::model::{
    CompletedSubtopics, Course, CurriculumNode, ProgressScope, Standard, SubjectCompletions,
    UserId,
};

use crate::error::RemoteError;

mod content;
mod progress;

/// What the progress service holds for one (user, course, standard).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    pub completed_subtopics: CompletedSubtopics,
    pub subject_completion: SubjectCompletions,
}

/// Full-state write for one (user, course, standard).
#[derive(Debug, Clone)]
pub struct SaveProgress {
    pub user: UserId,
    pub course: Course,
    pub standard: Standard,
    pub completed_subtopics: CompletedSubtopics,
    pub subject_completion: SubjectCompletions,
}

/// Remote source of truth for completion state.
#[async_trait]
pub trait RemoteProgress: Send + Sync {
    /// Fetch everything stored for the user's (course, standard). A user with
    /// no record yet yields an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the request fails.
    async fn fetch(
        &self,
        user: &UserId,
        course: Course,
        standard: Standard,
    ) -> Result<RemoteSnapshot, RemoteError>;

    /// Replace the stored state with `request`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the request fails.
    async fn save(&self, request: &SaveProgress) -> Result<(), RemoteError>;

    /// Delete every topic of `scope` for the user.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the request fails.
    async fn delete(&self, user: &UserId, scope: &ProgressScope) -> Result<(), RemoteError>;
}

/// Where curriculum trees come from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the topics of one subject. Malformed content yields no topics.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the request fails.
    async fn fetch_units(
        &self,
        course: Course,
        subject: &str,
        standard: Standard,
    ) -> Result<Vec<CurriculumNode>, RemoteError>;
}

/// HTTP client for both services, rooted at one base url.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the base url.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
