pub mod client;
pub mod config;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use client::{ClientError, ShopBackend, ShopClient};
pub use config::{Config, ConfigError, Overrides};
pub use session::{dispatch, ChatSession, Effect, SessionEvent, StalePolicy, Ticket};
pub use state::{ChatMessage, ChatRole, RequestId, RequestState};
