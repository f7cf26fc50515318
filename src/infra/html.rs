use crate::constants::MAX_PAGE_TEXT_CHARS;
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Node, Selector};
use std::sync::Arc;

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));

/// Elements whose text never describes an event.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "header", "footer", "nav", "aside"];

/// Turns a fetched page into the text handed to the extraction provider.
pub trait PageInterpreter: Send + Sync {
    fn interpret(&self, html: &str) -> String;
}

/// Body text with chrome and scripts removed, whitespace collapsed and the
/// result cut to `max_chars` characters.
pub struct GenericInterpreter {
    max_chars: usize,
}

impl Default for GenericInterpreter {
    fn default() -> Self {
        Self { max_chars: MAX_PAGE_TEXT_CHARS }
    }
}

impl GenericInterpreter {
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl PageInterpreter for GenericInterpreter {
    fn interpret(&self, html: &str) -> String {
        let doc = Html::parse_document(html);
        let root = doc.select(&BODY).next().unwrap_or_else(|| doc.root_element());

        let mut raw = String::new();
        for node in root.descendants() {
            let Node::Text(text) = node.value() else { continue };
            let hidden = node.ancestors().any(|a| match a.value() {
                Node::Element(e) => SKIPPED_ELEMENTS.contains(&e.name()),
                _ => false,
            });
            if !hidden {
                raw.push_str(text);
                raw.push(' ');
            }
        }

        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(self.max_chars)
            .collect()
    }
}

/// Picks a page interpreter by the URL's domain, falling back to the
/// generic one. A registered domain also matches its subdomains.
pub struct InterpreterRegistry {
    by_domain: Vec<(String, Arc<dyn PageInterpreter>)>,
    fallback: Arc<dyn PageInterpreter>,
}

impl Default for InterpreterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterRegistry {
    pub fn new() -> Self {
        Self {
            by_domain: Vec::new(),
            fallback: Arc::new(GenericInterpreter::default()),
        }
    }

    pub fn register(&mut self, domain: &str, interpreter: Arc<dyn PageInterpreter>) {
        let domain = domain.trim().trim_start_matches("www.").to_lowercase();
        self.by_domain.retain(|(d, _)| d != &domain);
        self.by_domain.push((domain, interpreter));
    }

    pub fn for_url(&self, url: &str) -> &dyn PageInterpreter {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()));
        let Some(host) = host else {
            return self.fallback.as_ref();
        };
        self.by_domain
            .iter()
            .filter(|(d, _)| host == *d || host.ends_with(&format!(".{d}")))
            .max_by_key(|(d, _)| d.len())
            .map(|(_, i)| i.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn interpret(&self, url: &str, html: &str) -> String {
        self.for_url(url).interpret(html)
    }
}
