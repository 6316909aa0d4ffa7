//! HTML parser for extracting links, text and metadata
//!
//! The `Parser` trait is the parsing collaborator of a worker: a pure
//! function from a fetched document to structured fields. `HtmlParser` is
//! the default implementation, built on `scraper`. Metadata comes from an
//! ordered list of `Extractor`s; custom extractors are registered at
//! construction time.

use crate::ParseError;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use url::Url;

/// Elements whose text is not part of the visible page text
const STRIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "template", "nav", "footer", "header",
];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    /// The page title (from <title>, falling back to the first <h1>)
    pub title: Option<String>,

    /// Visible text with whitespace collapsed
    pub text: String,

    /// Merged output of every extractor
    pub metadata: Map<String, Value>,

    /// Link targets exactly as found in the document (relative or absolute)
    pub links: Vec<String>,
}

/// Turns a fetched document into structured fields
pub trait Parser: Send + Sync {
    fn parse(&self, html: &str, url: &Url) -> Result<ParsedPage, ParseError>;
}

/// Pluggable metadata extractor
///
/// The returned keys are merged into `ParsedPage::metadata`; later
/// extractors overwrite keys of earlier ones.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, document: &Html, url: &Url) -> Result<Map<String, Value>, ParseError>;
}

fn selector(css: &str, url: &Url) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError {
        url: url.to_string(),
        message: format!("invalid selector {:?}: {:?}", css, e),
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Description, keywords, Open Graph properties, canonical URL and language
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataExtractor;

impl Extractor for MetadataExtractor {
    fn name(&self) -> &str {
        "metadata"
    }

    fn extract(&self, document: &Html, url: &Url) -> Result<Map<String, Value>, ParseError> {
        let mut metadata = Map::new();

        let meta_content = |name: &str| -> Result<Option<String>, ParseError> {
            let sel = selector(&format!("meta[name=\"{}\"][content]", name), url)?;
            Ok(document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()))
        };

        if let Some(description) = meta_content("description")? {
            metadata.insert("description".to_string(), json!(description));
        }

        if let Some(keywords) = meta_content("keywords")? {
            let keywords: Vec<&str> = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .collect();
            metadata.insert("keywords".to_string(), json!(keywords));
        }

        let mut open_graph = Map::new();
        for element in document.select(&selector("meta[property^=\"og:\"][content]", url)?) {
            let property = element.value().attr("property").unwrap_or_default();
            let content = element.value().attr("content").unwrap_or_default();
            if let Some(key) = property.strip_prefix("og:").filter(|k| !k.is_empty()) {
                if !content.is_empty() {
                    open_graph.insert(key.to_string(), json!(content));
                }
            }
        }
        if !open_graph.is_empty() {
            metadata.insert("open_graph".to_string(), Value::Object(open_graph));
        }

        if let Some(canonical) = document
            .select(&selector("link[rel=\"canonical\"][href]", url)?)
            .next()
            .and_then(|el| el.value().attr("href"))
        {
            metadata.insert("canonical_url".to_string(), json!(canonical));
        }

        if let Some(lang) = document
            .select(&selector("html[lang]", url)?)
            .next()
            .and_then(|el| el.value().attr("lang"))
        {
            metadata.insert("language".to_string(), json!(lang));
        }

        Ok(metadata)
    }
}

/// JSON-LD structured data blocks; malformed blocks are ignored
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLdExtractor;

impl Extractor for JsonLdExtractor {
    fn name(&self) -> &str {
        "json_ld"
    }

    fn extract(&self, document: &Html, url: &Url) -> Result<Map<String, Value>, ParseError> {
        let blocks: Vec<Value> = document
            .select(&selector("script[type=\"application/ld+json\"]", url)?)
            .filter_map(|script| {
                let raw = script.text().collect::<String>();
                match serde_json::from_str(raw.trim()) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "Ignoring malformed JSON-LD block");
                        None
                    }
                }
            })
            .collect();

        let mut metadata = Map::new();
        if !blocks.is_empty() {
            metadata.insert("json_ld".to_string(), Value::Array(blocks));
        }
        Ok(metadata)
    }
}

/// Heading outline, h1 through h6
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadingsExtractor;

impl Extractor for HeadingsExtractor {
    fn name(&self) -> &str {
        "headings"
    }

    fn extract(&self, document: &Html, url: &Url) -> Result<Map<String, Value>, ParseError> {
        let mut headings = Map::new();
        for level in 1..=6 {
            let tag = format!("h{}", level);
            let found: Vec<String> = document
                .select(&selector(&tag, url)?)
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect();
            if !found.is_empty() {
                headings.insert(tag, json!(found));
            }
        }

        let mut metadata = Map::new();
        if !headings.is_empty() {
            metadata.insert("headings".to_string(), Value::Object(headings));
        }
        Ok(metadata)
    }
}

/// Default `Parser` built on `scraper`
pub struct HtmlParser {
    extractors: Vec<Box<dyn Extractor>>,
}

impl HtmlParser {
    /// Creates a parser with the built-in extractors
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(MetadataExtractor),
                Box::new(JsonLdExtractor),
                Box::new(HeadingsExtractor),
            ],
        }
    }

    /// Creates a parser without any extractor
    pub fn without_extractors() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Registers an additional extractor, run after the existing ones
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn extractor_names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for HtmlParser {
    /// Parses HTML content and extracts links, text and metadata
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href="...">` tags anywhere in the document
    /// - `<link rel="canonical" href="...">`
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    ///
    /// Scheme filtering and resolution happen later, in the link filter.
    fn parse(&self, html: &str, url: &Url) -> Result<ParsedPage, ParseError> {
        if html.trim().is_empty() {
            return Err(ParseError {
                url: url.to_string(),
                message: "empty document".to_string(),
            });
        }

        let document = Html::parse_document(html);

        let title = extract_title(&document, url)?;
        let text = extract_text(&document);
        let links = extract_links(&document, url)?;

        let mut metadata = Map::new();
        for extractor in &self.extractors {
            match extractor.extract(&document, url) {
                Ok(fields) => metadata.extend(fields),
                Err(e) => {
                    tracing::debug!(url = %url, extractor = extractor.name(), error = %e, "Extractor failed");
                }
            }
        }

        Ok(ParsedPage {
            title,
            text,
            metadata,
            links,
        })
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html, url: &Url) -> Result<Option<String>, ParseError> {
    for css in ["title", "h1"] {
        let title = document
            .select(&selector(css, url)?)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty());
        if title.is_some() {
            return Ok(title);
        }
    }
    Ok(None)
}

/// Collects visible text, skipping stripped elements and comments
fn extract_text(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| STRIP_TAGS.contains(&el.name()))
        });

        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    collapse_whitespace(&text)
}

/// Extracts all candidate link targets from the HTML document
fn extract_links(document: &Html, url: &Url) -> Result<Vec<String>, ParseError> {
    let mut links = Vec::new();

    for element in document.select(&selector("a[href]", url)?) {
        if element.value().attr("download").is_some() {
            continue;
        }
        if let Some(href) = element.value().attr("href") {
            links.push(href.to_string());
        }
    }

    for element in document.select(&selector("link[rel=\"canonical\"][href]", url)?) {
        if let Some(href) = element.value().attr("href") {
            links.push(href.to_string());
        }
    }

    Ok(links)
}
