//! SmartTest backend: AI-generated study courses for the SmartTest client.
//!
//! A topic and difficulty go in; theory text plus a multiple-choice quiz come
//! out, generated by a chat-completion API reached through a chain of HTTP
//! transports. When generation is impossible an offline course is served
//! instead, so callers always get displayable content.

pub mod config;
pub mod domain;
pub mod fallback;
pub mod llm;
pub mod logic;
pub mod prompt;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod util;
pub mod validate;
