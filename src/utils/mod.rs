//! Utility functions and helpers.
//!
//! - `block`: soft-block detection shared by fetcher plugins
//! - `http`: reqwest client construction with optional proxy egress
//! - `tags`: skill tagging and experience-level matching
//! - `log`: console presentation helpers for the CLI

pub mod block;
pub mod http;
pub mod log;
pub mod tags;
mod url;

pub use self::url::{canonicalize_url, fill_template, get_domain, resolve_url};
