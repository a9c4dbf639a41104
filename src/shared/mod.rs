pub mod config;
pub mod error;
pub mod logging;
pub mod observer;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use observer::{ListenerRegistry, Subscription};
