use crate::frontier::CrawlScope;
use crate::url::resolve_link;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use url::Url;

/// Turns the hrefs of a page into crawl candidates
///
/// Resolution and normalization come first, then exclusion patterns, then
/// the run's scope (domain set and `depth + 1 <= max_depth`). Duplicates
/// within one page are dropped, keeping first-seen order.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    scope: CrawlScope,
    excluded: Vec<Regex>,
}

impl LinkFilter {
    /// Creates a filter; exclusion patterns are case-insensitive
    pub fn new(scope: CrawlScope, excluded_patterns: &[String]) -> Result<Self, regex::Error> {
        let excluded = excluded_patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<_, _>>()?;

        Ok(Self { scope, excluded })
    }

    pub fn scope(&self) -> &CrawlScope {
        &self.scope
    }

    /// Returns true if the URL matches an exclusion pattern
    pub fn is_excluded(&self, url: &Url) -> bool {
        self.excluded.iter().any(|p| p.is_match(url.as_str()))
    }

    /// Resolves hrefs against `base` into unique absolute URLs
    pub fn resolve_all(&self, base: &Url, hrefs: &[String]) -> Vec<Url> {
        let mut seen = HashSet::new();
        hrefs
            .iter()
            .filter_map(|href| resolve_link(base, href))
            .filter(|url| seen.insert(url.as_str().to_string()))
            .collect()
    }

    /// Selects the links of a page at `parent_depth` that may be enqueued
    pub fn candidates(&self, links: &[Url], parent_depth: u32) -> Vec<Url> {
        let child_depth = parent_depth + 1;
        if child_depth > self.scope.max_depth() {
            return Vec::new();
        }

        links
            .iter()
            .filter(|url| !self.is_excluded(url))
            .filter(|url| self.scope.admits_url(url, child_depth))
            .cloned()
            .collect()
    }
}
