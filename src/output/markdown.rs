//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including statistics, per-status counts, and crawled domains.

use crate::crawler::CrawlSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Domains listed before the list is truncated
const MAX_LISTED_DOMAINS: usize = 50;

/// Writes the markdown summary of a run to `output_path`
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(std::io::Error)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
        summary.elapsed_seconds,
        summary.elapsed_seconds / 60.0
    ));
    md.push_str(&format!("- **Stop Reason**: {}\n\n", summary.stop_reason));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Pages Crawled**: {}\n",
        summary.total_pages_crawled
    ));
    md.push_str(&format!("- **Failed**: {}\n", summary.total_failed));
    md.push_str(&format!("- **Skipped**: {}\n", summary.total_skipped));
    md.push_str(&format!(
        "- **Rate Limited**: {}\n",
        summary.total_rate_limited
    ));
    md.push_str(&format!(
        "- **URLs Discovered**: {}\n",
        summary.total_urls_found
    ));
    md.push_str(&format!(
        "- **Links Discarded While Draining**: {}\n",
        summary.links_discarded
    ));
    md.push_str(&format!("- **Retries**: {}\n", summary.total_retries));
    md.push_str(&format!(
        "- **Bytes Downloaded**: {}\n",
        summary.total_bytes_downloaded
    ));
    md.push_str(&format!(
        "- **Pages/Second**: {:.2}\n",
        summary.pages_per_second
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if !summary.status_counts.is_empty() {
        md.push_str("## Status Breakdown\n\n");
        md.push_str("| Status | Count |\n");
        md.push_str("|--------|-------|\n");
        for (status, count) in &summary.status_counts {
            md.push_str(&format!("| {} | {} |\n", status, count));
        }
        md.push('\n');
    }

    if !summary.domains_crawled.is_empty() {
        md.push_str("## Domains Crawled\n\n");
        md.push_str(&format!("Total: {}\n\n", summary.domains_crawled.len()));
        for domain in summary.domains_crawled.iter().take(MAX_LISTED_DOMAINS) {
            md.push_str(&format!("- {}\n", domain));
        }
        if summary.domains_crawled.len() > MAX_LISTED_DOMAINS {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.domains_crawled.len() - MAX_LISTED_DOMAINS
            ));
        }
        md.push('\n');
    }

    md
}

/// Prints a summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");
    println!("  Pages crawled: {}", summary.total_pages_crawled);
    println!("  Failed: {}", summary.total_failed);
    println!("  Skipped: {}", summary.total_skipped);
    println!("  Rate limited: {}", summary.total_rate_limited);
    println!("  URLs discovered: {}", summary.total_urls_found);
    println!("  Domains: {}", summary.domains_crawled.len());
    println!(
        "  Elapsed: {:.1}s ({:.2} pages/sec)",
        summary.elapsed_seconds, summary.pages_per_second
    );
    println!("  Stopped: {}", summary.stop_reason);
}
