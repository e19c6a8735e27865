//! Parley: conversation orchestration for chat-facing LLM assistants.
//!
//! The engine sits between a chat transport, a model provider and a set of
//! tools. Per chat it keeps a conversation, runs a bounded tool-use loop,
//! streams answers into throttled message edits and keeps the stored
//! history valid for the provider API across turns.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley::prelude::*;
//!
//! # async fn example(
//! #     provider: Arc<dyn ModelProvider>,
//! #     transport: Arc<dyn Transport>,
//! # ) -> parley::error::Result<()> {
//! let config = EngineConfig::from_env();
//! config.validate()?;
//! let engine = Engine::new(config, provider, transport);
//! let result = engine.process(42, "What changed in the last release?").await;
//! println!("{:?}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod sanitize;
pub mod store;
pub mod streaming;
pub mod tools;
pub mod transport;
pub mod types;
pub mod util;
