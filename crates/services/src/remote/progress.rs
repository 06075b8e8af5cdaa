use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use prep_core::model::{
    CompletedSubtopics, Course, ProgressScope, Standard, SubjectCompletions, UserId,
};

use super::{ApiClient, RemoteProgress, RemoteSnapshot, SaveProgress};
use crate::error::RemoteError;

#[async_trait]
impl RemoteProgress for ApiClient {
    async fn fetch(
        &self,
        user: &UserId,
        course: Course,
        standard: Standard,
    ) -> Result<RemoteSnapshot, RemoteError> {
        let mut url = self.endpoint(&["api", "progress", user.as_str()])?;
        url.query_pairs_mut()
            .append_pair("course", course.as_str())
            .append_pair("standard", standard.as_str());

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(user = %user, %course, %standard, "no remote progress yet");
            return Ok(RemoteSnapshot::default());
        }
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        let body: Value = response.json().await?;
        Ok(snapshot_from_body(&body))
    }

    async fn save(&self, request: &SaveProgress) -> Result<(), RemoteError> {
        let url = self.endpoint(&["api", "progress", "save"])?;
        let response = self
            .client
            .post(url)
            .json(&save_body(request))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        Ok(())
    }

    async fn delete(&self, user: &UserId, scope: &ProgressScope) -> Result<(), RemoteError> {
        let mut url = self.endpoint(&["api", "progress", "delete"])?;
        url.query_pairs_mut()
            .append_pair("userId", user.as_str())
            .append_pair("course", scope.course.as_str())
            .append_pair("standard", scope.standard.as_str())
            .append_pair("subject", &scope.subject);

        let response = self.client.delete(url).send().await?;
        // Nothing stored remotely is already the requested state.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

fn snapshot_from_body(body: &Value) -> RemoteSnapshot {
    if !body.is_object() {
        tracing::warn!("progress response is not an object, treating as empty");
        return RemoteSnapshot::default();
    }
    RemoteSnapshot {
        completed_subtopics: body
            .get("completedSubtopics")
            .map(CompletedSubtopics::from_remote)
            .unwrap_or_default(),
        subject_completion: body
            .get("subjectCompletion")
            .map(SubjectCompletions::from_remote)
            .unwrap_or_default(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveBody<'a> {
    user_id: &'a str,
    course: &'static str,
    standard: &'static str,
    completed_subtopics: Value,
    subject_completion: Value,
}

fn save_body(request: &SaveProgress) -> SaveBody<'_> {
    SaveBody {
        user_id: request.user.as_str(),
        course: request.course.as_str(),
        standard: request.standard.as_str(),
        completed_subtopics: request.completed_subtopics.to_remote(),
        subject_completion: request.subject_completion.to_remote(),
    }
}
