//! Core types.

pub mod generation;
pub mod message;
pub mod response;
pub mod run;
pub mod stream;
pub mod usage;

pub use generation::*;
pub use message::*;
pub use response::*;
pub use run::*;
pub use stream::*;
pub use usage::*;

/// Chat identifier used by the transport.
pub type ChatId = i64;
