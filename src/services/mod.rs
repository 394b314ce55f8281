//! Service layer modules for external integrations.
//!
//! Contains the AI narrative service client and the summarizer capability
//! wrapping it.

pub mod ai_client;
pub mod summarizer;

pub use ai_client::AiClient;
pub use summarizer::{AiSummarizer, NoopSummarizer, Summarizer};
