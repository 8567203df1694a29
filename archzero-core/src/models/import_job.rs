use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// `pending -> processing -> {completed | failed | cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed | ImportStatus::Failed | ImportStatus::Cancelled
        )
    }

    /// Staying in the same state is always allowed (two polls can observe it).
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            ImportStatus::Pending => next == ImportStatus::Processing,
            ImportStatus::Processing => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A per-row failure or warning recorded by the import engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    pub row: u64,
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub status: ImportStatus,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub failed_rows: u64,
    #[serde(default)]
    pub errors: Vec<ImportError>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn check_counters(&self) -> Result<(), ValidationError> {
        if self.processed_rows > self.total_rows {
            return Err(ValidationError::new(format!(
                "processed_rows ({}) exceeds total_rows ({})",
                self.processed_rows, self.total_rows
            )));
        }
        if self.successful_rows.checked_add(self.failed_rows) != Some(self.processed_rows) {
            return Err(ValidationError::new(format!(
                "successful_rows ({}) + failed_rows ({}) != processed_rows ({})",
                self.successful_rows, self.failed_rows, self.processed_rows
            )));
        }
        Ok(())
    }

    /// Fraction of rows processed, clamped to `[0, 1]`. An empty job counts as
    /// done once it is terminal.
    pub fn progress(&self) -> f64 {
        if self.total_rows == 0 {
            return if self.status.is_terminal() { 1.0 } else { 0.0 };
        }
        (self.processed_rows as f64 / self.total_rows as f64).clamp(0.0, 1.0)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ImportError> {
        self.errors.iter().filter(|e| e.severity == Severity::Warning)
    }
}
