//! # tagsync Common Library
//!
//! Shared code for the tagsync server and client including:
//! - Wire protocol (sentinel-prefixed, command-tagged frames)
//! - Clip segmentation and synchronized group layout
//! - Label cell format and the projected row table
//! - Event bus used to fan out session notifications
//! - Configuration file helpers
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod labels;
pub mod layout;
pub mod protocol;

pub use error::{Error, Result};
pub use layout::{Clip, GroupLayout};
