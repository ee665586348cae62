//! Natural-language front end for a static acupuncture-research dataset.
//!
//! A user question goes through an LLM provider (Claude or Gemini) to become
//! structured search filters, the pre-existing search engine runs them, and
//! an optional second LLM pass summarizes the results. The relay module is
//! the server side: a CORS-open forwarder for the Claude API, which browsers
//! cannot call directly.

pub mod config;
pub mod digest;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod relay;
pub mod render;
pub mod service;
pub mod session;
pub mod transport;

pub use error::{NliError, Result};
