//! URL handling module for Sumi-Crawl
//!
//! This module provides URL normalization (the dedup key of the frontier),
//! link resolution, domain extraction and domain pattern sets.

mod domain;
mod normalize;

pub use domain::{extract_domain, DomainSet};
pub use normalize::{normalize_url, resolve_link};
