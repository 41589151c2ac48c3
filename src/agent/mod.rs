//! Agent module — per-user contexts, command parsing, and the agent loop.

pub mod agent_loop;
pub mod registry;
pub mod submission;
pub mod user_context;

pub use agent_loop::{Agent, AgentDeps};
pub use registry::UserRegistry;
pub use submission::{Submission, SubmissionParser};
pub use user_context::{Snapshot, UserContext};
