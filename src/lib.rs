//! Codebridge - session-scoped files and code execution on top of a
//! stateless Judge0-compatible execution backend.
//!
//! The backend knows nothing about sessions or files. This crate keeps a
//! TTL-bounded file store, bundles stored files into each submission and
//! turns every backend result into one normalized response.

pub mod archive;
pub mod artifacts;
pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod http_server;
pub mod languages;
pub mod state;
pub mod store;
