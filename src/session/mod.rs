//! Chat sessions: configuration, transcript, and lifecycle.

pub mod manager;
pub mod model;
pub mod transcript;

pub use manager::{Session, SessionManager};
pub use model::{ModelId, SessionConfig, Temperature};
pub use transcript::{Role, Transcript, Turn, TurnRecord};
