//! Block Source
//!
//! Fetches the latest block from an external HTTP endpoint.
//!
//! - [`SourceClient`]: HTTP GET with per-attempt timeout and exponential backoff
//! - [`parser`]: Rule tables that normalize loosely-shaped JSON into a [`Block`](crate::Block)

mod client;
mod error;
pub mod parser;

pub use client::{
    DEFAULT_BACKOFF_BASE, DEFAULT_HEALTH_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT,
    SourceClient, SourceConfig,
};
pub use error::SourceError;
