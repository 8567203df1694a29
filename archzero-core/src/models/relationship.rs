use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Closed set of edge types between two cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    DependsOn,
    Implements,
    SimilarTo,
    ConflictsWith,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        RelationshipType::DependsOn,
        RelationshipType::Implements,
        RelationshipType::SimilarTo,
        RelationshipType::ConflictsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::Implements => "implements",
            RelationshipType::SimilarTo => "similar_to",
            RelationshipType::ConflictsWith => "conflicts_with",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new(format!(
                    "unknown relationship type {s:?} (expected one of depends_on, implements, similar_to, conflicts_with)"
                ))
            })
    }
}

/// Directed, typed, time-bounded edge between two cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub from_card_id: String,
    pub to_card_id: String,
    pub relationship_type: RelationshipType,
    pub valid_from: DateTime<Utc>,
    /// `None` means open-ended.
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Whether the validity window contains `at` (both ends inclusive).
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |to| at <= to)
    }

    pub fn check_validity_window(&self) -> Result<(), ValidationError> {
        check_window(Some(self.valid_from), self.valid_to)
    }
}

fn check_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match (from, to) {
        (Some(from), Some(to)) if to < from => Err(ValidationError::new(format!(
            "validTo ({to}) is earlier than validFrom ({from})"
        ))),
        _ => Ok(()),
    }
}

fn check_confidence(confidence: Option<f64>) -> Result<(), ValidationError> {
    match confidence {
        Some(c) if !c.is_finite() => Err(ValidationError::new(format!(
            "confidence must be a finite number, got {c}"
        ))),
        _ => Ok(()),
    }
}

/// Body of `POST /relationships`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationshipRequest {
    pub from_card_id: String,
    pub to_card_id: String,
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl CreateRelationshipRequest {
    pub fn new(
        from_card_id: impl Into<String>,
        to_card_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            from_card_id: from_card_id.into(),
            to_card_id: to_card_id.into(),
            relationship_type,
            valid_from: None,
            valid_to: None,
            attributes: None,
            confidence: None,
        }
    }

    pub fn valid_from(mut self, at: DateTime<Utc>) -> Self {
        self.valid_from = Some(at);
        self
    }

    pub fn valid_to(mut self, at: DateTime<Utc>) -> Self {
        self.valid_to = Some(at);
        self
    }

    pub fn attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Card ids must be non-empty; self-edges are left to the backend.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.from_card_id.trim().is_empty() {
            return Err(ValidationError::new("fromCardId must not be empty"));
        }
        if self.to_card_id.trim().is_empty() {
            return Err(ValidationError::new("toCardId must not be empty"));
        }
        check_window(self.valid_from, self.valid_to)?;
        check_confidence(self.confidence)
    }
}

/// Body of `PATCH /relationships/{id}`. Endpoints are not part of the patch:
/// an edge's cards never change after creation.
///
/// `valid_to` is tri-state: `None` leaves it untouched, `Some(None)` clears it
/// (serialized as `null`), `Some(Some(t))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelationshipRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<RelationshipType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl UpdateRelationshipRequest {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Only checks what the patch itself carries; a new `validTo` against the
    /// stored `validFrom` is the backend's call.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_window(self.valid_from, self.valid_to.flatten())?;
        check_confidence(self.confidence)
    }
}
