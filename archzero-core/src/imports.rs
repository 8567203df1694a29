//! Read-only view of server-side import jobs.

use std::time::Duration;

use crate::http::{ApiClient, ApiError};
use crate::models::ImportJob;
use crate::scope::RequestScope;

#[derive(Debug, Clone)]
pub struct ImportJobService {
    api: ApiClient,
}

impl ImportJobService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn get(&self, job_id: &str) -> Result<ImportJob, ApiError> {
        let path = format!("/import/jobs/{}", urlencoding::encode(job_id));
        let job: ImportJob = self.api.get_json(&path, &[]).await?;
        if let Err(e) = job.check_counters() {
            tracing::warn!(job_id, error = %e, "Import job counters are inconsistent");
        }
        Ok(job)
    }

    /// Poll every `interval` until the job reaches a terminal status or
    /// `scope` is cancelled.
    pub async fn poll(
        &self,
        job_id: &str,
        interval: Duration,
        scope: &RequestScope,
    ) -> Result<ImportJob, ApiError> {
        let mut previous: Option<ImportJob> = None;
        loop {
            let job = scope.run(self.get(job_id)).await??;

            if let Some(prev) = &previous {
                if !prev.status.can_transition_to(job.status) {
                    tracing::warn!(
                        job_id,
                        from = ?prev.status,
                        to = ?job.status,
                        "Import job made an unexpected status transition"
                    );
                }
                if job.errors.len() < prev.errors.len() {
                    tracing::warn!(job_id, "Import job error list shrank between polls");
                }
            }

            tracing::debug!(
                job_id,
                status = ?job.status,
                processed = job.processed_rows,
                total = job.total_rows,
                "Import job polled"
            );

            if job.status.is_terminal() {
                return Ok(job);
            }
            previous = Some(job);

            scope.run(tokio::time::sleep(interval)).await?;
        }
    }
}
