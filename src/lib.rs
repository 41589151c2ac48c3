//! Grantbuddy — grant-writing assistant core.
//!
//! A guided interview ([`wizard`]) collects facts about the writer and the
//! project; a chat session ([`session`]) talks to the hosted model with a
//! seeded context and a strictly alternating transcript.

pub mod agent;
pub mod channels;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod llm;
pub mod session;
pub mod store;
pub mod wizard;
