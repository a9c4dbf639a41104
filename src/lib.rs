pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use shared::logging::init_logging;
pub use state::{EngineCollaborators, OfflineEngine};
