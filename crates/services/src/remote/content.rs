use async_trait::async_trait;
use serde_json::Value;

use prep_core::model::{Course, CurriculumNode, Standard, parse_units};

use super::{ApiClient, ContentSource};
use crate::error::RemoteError;

#[async_trait]
impl ContentSource for ApiClient {
    async fn fetch_units(
        &self,
        course: Course,
        subject: &str,
        standard: Standard,
    ) -> Result<Vec<CurriculumNode>, RemoteError> {
        let url = self.endpoint(&[
            "api",
            "getAllUnits",
            course.as_str(),
            subject,
            standard.as_str(),
        ])?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }
        let body: Value = response.json().await?;
        let units = parse_units(body);
        tracing::debug!(%course, subject, %standard, topics = units.len(), "fetched curriculum");
        Ok(units)
    }
}
