//! Output module for crawl summaries
//!
//! Renders the `CrawlSummary` of a finished run as markdown or as a short
//! console report.

mod markdown;

pub use markdown::{format_markdown_summary, generate_markdown_summary, print_summary};
