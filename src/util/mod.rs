//! Utility modules: retry, timeout, truncation.

pub mod retry;
pub mod timeout;
pub mod truncate;
