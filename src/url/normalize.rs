use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking information
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "mc_cid", "msclkid", "yclid"];

/// Normalizes a URL into the form used for deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only http and https (the scheme itself is kept)
/// 3. Lowercase the host
/// 4. Remove dot segments and duplicate slashes; drop the trailing slash
///    except for the root path
/// 5. Remove the fragment
/// 6. Remove tracking query parameters, sort the rest, drop an empty query
///
/// # Examples
///
/// ```
/// use sumi_crawl::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/a/../docs/?utm_source=x#intro").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize(url)
}

/// Resolves an href found on `base` and normalizes the result
///
/// Returns None for hrefs that do not point at a crawlable page
/// (`javascript:`, `mailto:`, `tel:`, `data:` and fragment-only links).
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let joined = base.join(href).ok()?;
    normalize(joined).ok()
}

fn normalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    // The url crate already lowercases registered host names; IP hosts pass through
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filtered_query_pairs(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }

    Ok(url)
}

/// Removes dot segments, empty segments and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn filtered_query_pairs(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Stable sort keeps repeated keys in document order
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_preserved() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_root_keeps_slash() {
        assert_eq!(
            normalize_url("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            normalize_url("https://example.com/").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_dot_segments_and_duplicate_slashes() {
        let result = normalize_url("https://example.com//a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_tracking_params_removed_and_rest_sorted() {
        let result =
            normalize_url("https://example.com/p?b=2&utm_medium=email&a=1&fbclid=x").unwrap();
        assert_eq!(result.as_str(), "https://example.com/p?a=1&b=2");
    }

    #[test]
    fn test_only_tracking_params_drops_query() {
        let result = normalize_url("https://example.com/p?utm_source=a&gclid=b").unwrap();
        assert_eq!(result.as_str(), "https://example.com/p");
    }

    #[test]
    fn test_port_is_kept() {
        let result = normalize_url("http://127.0.0.1:8080/a/").unwrap();
        assert_eq!(result.as_str(), "http://127.0.0.1:8080/a");
    }

    #[test]
    fn test_equivalent_forms_normalize_identically() {
        let a = normalize_url("https://Example.com/docs/#top").unwrap();
        let b = normalize_url("https://example.com/docs").unwrap();
        let c = normalize_url("https://example.com/x/../docs/").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_resolve_relative_link() {
        let base = Url::parse("https://example.com/docs/intro").unwrap();
        assert_eq!(
            resolve_link(&base, "guide#part-2").unwrap().as_str(),
            "https://example.com/docs/guide"
        );
        assert_eq!(
            resolve_link(&base, "/about/").unwrap().as_str(),
            "https://example.com/about"
        );
        assert_eq!(
            resolve_link(&base, "//other.org/x").unwrap().as_str(),
            "https://other.org/x"
        );
    }

    #[test]
    fn test_resolve_skips_non_page_links() {
        let base = Url::parse("https://example.com/").unwrap();
        for href in [
            "",
            "#top",
            "javascript:void(0)",
            "JavaScript:alert(1)",
            "mailto:a@example.com",
            "tel:+123",
            "data:text/html,hi",
            "ftp://example.com/file",
        ] {
            assert!(resolve_link(&base, href).is_none(), "href {:?}", href);
        }
    }
}
