pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod imports;
pub mod models;
pub mod relationships;
pub mod scope;
pub mod session;
pub mod storage;

pub use client::ArchZeroClient;
pub use config::ArchZeroConfig;
pub use error::{ArchZeroError, ValidationError};
pub use guard::{AccessGuard, GuardDecision};
pub use http::{ApiClient, ApiError};
pub use imports::ImportJobService;
pub use relationships::{RelationshipApi, RelationshipService};
pub use scope::{Cancelled, RequestScope};
pub use session::{AuthError, SessionSource, SessionStore};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
