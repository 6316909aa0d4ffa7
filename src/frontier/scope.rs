use crate::config::CrawlerConfig;
use crate::model::CrawlRequest;
use crate::url::{extract_domain, DomainSet};
use url::Url;

/// Depth and domain bounds of one crawl run
///
/// Domains are restricted to `allowed-domains` when that list is set,
/// otherwise to the seed domains when `same-domain-only` is on, otherwise
/// not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlScope {
    max_depth: u32,
    domains: Option<DomainSet>,
}

impl CrawlScope {
    pub fn new(max_depth: u32, domains: Option<DomainSet>) -> Self {
        Self { max_depth, domains }
    }

    /// A scope bounded only by depth
    pub fn unrestricted(max_depth: u32) -> Self {
        Self::new(max_depth, None)
    }

    /// Derives the scope of a run from its configuration and seed URLs
    pub fn from_config(config: &CrawlerConfig, seeds: &[Url]) -> Self {
        let domains = if !config.allowed_domains.is_empty() {
            Some(DomainSet::new(&config.allowed_domains))
        } else if config.same_domain_only {
            Some(DomainSet::new(seeds.iter().filter_map(extract_domain)))
        } else {
            None
        };

        Self::new(config.max_depth, domains)
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn domains(&self) -> Option<&DomainSet> {
        self.domains.as_ref()
    }

    /// Returns true if a URL at `depth` lies within the run's bounds
    pub fn admits_url(&self, url: &Url, depth: u32) -> bool {
        if depth > self.max_depth {
            return false;
        }

        match &self.domains {
            Some(domains) => extract_domain(url).is_some_and(|domain| domains.contains(&domain)),
            None => true,
        }
    }

    pub fn admits(&self, request: &CrawlRequest) -> bool {
        self.admits_url(&request.url, request.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn create_test_config() -> CrawlerConfig {
        CrawlerConfig {
            max_depth: 2,
            ..CrawlerConfig::default()
        }
    }

    #[test]
    fn test_same_domain_uses_seed_domains() {
        let seeds = vec![url("https://a.test/"), url("https://b.test/start")];
        let scope = CrawlScope::from_config(&create_test_config(), &seeds);

        assert!(scope.admits_url(&url("https://a.test/x"), 1));
        assert!(scope.admits_url(&url("https://b.test/y"), 2));
        assert!(!scope.admits_url(&url("https://c.test/"), 1));
        assert!(!scope.admits_url(&url("https://sub.a.test/"), 1));
    }

    #[test]
    fn test_depth_bound() {
        let seeds = vec![url("https://a.test/")];
        let scope = CrawlScope::from_config(&create_test_config(), &seeds);

        assert!(scope.admits_url(&url("https://a.test/deep"), 2));
        assert!(!scope.admits_url(&url("https://a.test/deeper"), 3));
    }

    #[test]
    fn test_allowed_domains_override_seed_domains() {
        let config = CrawlerConfig {
            allowed_domains: vec!["*.example.org".to_string()],
            ..create_test_config()
        };
        let scope = CrawlScope::from_config(&config, &[url("https://a.test/")]);

        assert!(scope.admits_url(&url("https://docs.example.org/"), 0));
        assert!(!scope.admits_url(&url("https://a.test/"), 0));
    }

    #[test]
    fn test_cross_domain_allowed_when_not_same_domain_only() {
        let config = CrawlerConfig {
            same_domain_only: false,
            ..create_test_config()
        };
        let scope = CrawlScope::from_config(&config, &[url("https://a.test/")]);

        assert!(scope.domains().is_none());
        assert!(scope.admits_url(&url("https://anywhere.test/"), 1));
    }
}
