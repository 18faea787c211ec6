// Session management
// Credential persistence and the single-flight token refresh protocol

pub mod coordinator;
pub mod refresh;
pub mod store;
pub mod types;

pub use coordinator::{FlightOutcome, FlightTicket, RefreshCoordinator};
pub use store::{CredentialStore, MemoryBackend, SqliteBackend, StorageBackend};
pub use types::{Credential, LoginRequest, Role, SessionEnvelope, SessionUser};
