pub mod card;
pub mod import_job;
pub mod relationship;
pub mod session;

pub use card::{Card, CardList};
pub use import_job::{ImportError, ImportJob, ImportStatus, Severity};
pub use relationship::{
    CreateRelationshipRequest, Relationship, RelationshipType, UpdateRelationshipRequest,
};
pub use session::{LoginRequest, LoginResponse, PersistedSession, Role, Session, User};
