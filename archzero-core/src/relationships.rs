//! Relationship service: typed CRUD over card-to-card edges.
//!
//! Endpoints:
//! - POST   /relationships            create
//! - GET    /relationships?card_id=X  edges touching a card (backend decides which side)
//! - GET    /relationships            all edges
//! - PATCH  /relationships/{id}       partial update
//! - DELETE /relationships/{id}       delete
//! - GET    /cards                    candidate cards for a new edge
//!
//! Authorization is the gateway's job; nothing here checks the session. There
//! is no conflict detection: concurrent updates to one edge race at the
//! backend and the last write wins.

use async_trait::async_trait;

use crate::http::{ApiClient, ApiError};
use crate::models::{
    Card, CardList, CreateRelationshipRequest, Relationship, UpdateRelationshipRequest,
};

const RELATIONSHIPS_PATH: &str = "/relationships";
const CARDS_PATH: &str = "/cards";

/// The relationship operations a view depends on.
#[async_trait]
pub trait RelationshipApi: Send + Sync {
    async fn create(&self, request: &CreateRelationshipRequest) -> Result<Relationship, ApiError>;

    async fn get_for_card(&self, card_id: &str) -> Result<Vec<Relationship>, ApiError>;

    async fn get_all(&self) -> Result<Vec<Relationship>, ApiError>;

    async fn update(
        &self,
        id: &str,
        patch: &UpdateRelationshipRequest,
    ) -> Result<Relationship, ApiError>;

    /// Not idempotent: deleting an unknown id fails with a 404 `HttpError`.
    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Every card except `current_card_id`.
    async fn get_available_cards(&self, current_card_id: &str) -> Result<Vec<Card>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct RelationshipService {
    api: ApiClient,
}

impl RelationshipService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn relationship_path(id: &str) -> String {
    format!("{}/{}", RELATIONSHIPS_PATH, urlencoding::encode(id))
}

/// Backend data that breaks the window invariant is surfaced in the logs but
/// still returned; the client does not own relationship data.
fn warn_on_invalid_windows(relationships: &[Relationship]) {
    for rel in relationships {
        if let Err(e) = rel.check_validity_window() {
            tracing::warn!(relationship_id = %rel.id, error = %e, "Backend returned relationship with invalid validity window");
        }
    }
}

#[async_trait]
impl RelationshipApi for RelationshipService {
    async fn create(&self, request: &CreateRelationshipRequest) -> Result<Relationship, ApiError> {
        request.validate()?;

        let created: Relationship = self.api.post_json(RELATIONSHIPS_PATH, request).await?;
        warn_on_invalid_windows(std::slice::from_ref(&created));

        tracing::info!(
            relationship_id = %created.id,
            from = %created.from_card_id,
            to = %created.to_card_id,
            relationship_type = %created.relationship_type,
            "Relationship created"
        );
        Ok(created)
    }

    async fn get_for_card(&self, card_id: &str) -> Result<Vec<Relationship>, ApiError> {
        let relationships: Vec<Relationship> = self
            .api
            .get_json(RELATIONSHIPS_PATH, &[("card_id", card_id)])
            .await?;
        warn_on_invalid_windows(&relationships);
        tracing::debug!(card_id, count = relationships.len(), "Fetched card relationships");
        Ok(relationships)
    }

    async fn get_all(&self) -> Result<Vec<Relationship>, ApiError> {
        let relationships: Vec<Relationship> = self.api.get_json(RELATIONSHIPS_PATH, &[]).await?;
        warn_on_invalid_windows(&relationships);
        tracing::debug!(count = relationships.len(), "Fetched all relationships");
        Ok(relationships)
    }

    async fn update(
        &self,
        id: &str,
        patch: &UpdateRelationshipRequest,
    ) -> Result<Relationship, ApiError> {
        patch.validate()?;

        let updated: Relationship = self.api.patch_json(&relationship_path(id), patch).await?;
        warn_on_invalid_windows(std::slice::from_ref(&updated));

        tracing::info!(relationship_id = %updated.id, "Relationship updated");
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete(&relationship_path(id)).await?;
        tracing::info!(relationship_id = id, "Relationship deleted");
        Ok(())
    }

    async fn get_available_cards(&self, current_card_id: &str) -> Result<Vec<Card>, ApiError> {
        let list: CardList = self.api.get_json(CARDS_PATH, &[]).await?;
        let available: Vec<Card> = list
            .data
            .into_iter()
            .filter(|card| card.id != current_card_id)
            .collect();
        tracing::debug!(
            current_card_id,
            total = list.total,
            available = available.len(),
            "Fetched available cards"
        );
        Ok(available)
    }
}

// ============================================================================
// TESTS
// ============================================================================
