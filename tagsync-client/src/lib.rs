//! tagsync-client library
//!
//! Connection session, image cache and group navigation for a reviewer
//! labelling rows held by a tagsync-server. Rendering is left to the caller,
//! which subscribes to [`tagsync_common::events::ClientEvent`]s.

pub mod cache;
pub mod config;
pub mod error;
pub mod navigator;
pub mod selection;
pub mod session;

pub use cache::{CacheEntry, ImageCache};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use navigator::Navigator;
pub use selection::Selection;
pub use session::{ClientSession, SessionSummary, SubmitOutcome};
