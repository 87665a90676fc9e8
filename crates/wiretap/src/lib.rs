//! Wiretap - transparent HTTP proxy that records LLM agent traffic
//!
//! Sits between agents and their inference providers (OpenAI-compatible,
//! Anthropic, Ollama), relays every request byte-for-byte, reconstructs
//! streamed responses, and persists the full exchange to SQLite.

pub mod admin;
pub mod config;
pub mod error;
pub mod model;
pub mod providers;
pub mod proxy;
pub mod redact;
pub mod storage;

pub use error::WiretapError;
