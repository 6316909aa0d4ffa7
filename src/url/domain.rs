use url::Url;

/// Extracts the domain from a URL
///
/// The domain is the lowercase host, without the port. Rate limiting and
/// domain scoping are both keyed on this value.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// A set of domain patterns a crawl is allowed to visit
///
/// Patterns are either exact (`example.com`) or wildcards (`*.example.com`),
/// where a wildcard matches the bare domain and any subdomain of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet {
    patterns: Vec<String>,
}

impl DomainSet {
    /// Builds a set from patterns; patterns are lowercased
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for pattern in patterns {
            set.insert(pattern.as_ref());
        }
        set
    }

    /// Adds a pattern unless it is already present
    pub fn insert(&mut self, pattern: &str) {
        let pattern = pattern.trim().to_lowercase();
        if !pattern.is_empty() && !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if the (lowercase) domain matches any pattern
    pub fn contains(&self, domain: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| matches_pattern(pattern, domain))
    }
}

fn matches_pattern(pattern: &str, domain: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            domain == base
                || (domain.len() > base.len()
                    && domain.ends_with(base)
                    && domain.as_bytes()[domain.len() - base.len() - 1] == b'.')
        }
        None => domain == pattern,
    }
}
