//! tagsync-server library
//!
//! Owns the authoritative label matrix and the image files, and answers
//! framed requests from any number of concurrently connected reviewers.

pub mod config;
pub mod context;
pub mod dataset;
pub mod delivery;
pub mod error;
pub mod server;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use error::{Error, Result};
pub use server::Server;
