//! User-supplied CSS selector handling.
//!
//! Configuration files often name a class without its leading dot
//! (`blog-post` instead of `.blog-post`). [`normalize_selector`] applies that
//! prefix explicitly before anything is compiled.

use scraper::{ElementRef, Html, Selector};

use crate::TransformError;

const CSS_PUNCTUATION: &[char] = &[
    '.', '#', '[', ']', ':', '>', '+', '~', '*', ',', '(', ')', '=', ' ', '\t', '\n',
];

const HTML_TAGS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "audio", "b", "blockquote", "body", "br",
    "button", "caption", "cite", "code", "dd", "details", "div", "dl", "dt", "em", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hr", "html",
    "i", "iframe", "img", "input", "label", "li", "main", "mark", "meta", "nav", "noscript", "ol",
    "p", "picture", "pre", "script", "section", "small", "source", "span", "strong", "style",
    "sub", "summary", "sup", "table", "tbody", "td", "template", "tfoot", "th", "thead", "time",
    "title", "tr", "u", "ul", "video",
];

/// Bare identifiers that are not HTML tag names are treated as class names.
pub fn normalize_selector(spec: &str) -> String {
    let trimmed = spec.trim();
    if trimmed.is_empty() || trimmed.contains(CSS_PUNCTUATION) {
        return trimmed.to_string();
    }
    if HTML_TAGS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return trimmed.to_string();
    }
    format!(".{trimmed}")
}

pub fn compile(spec: &str) -> Result<Selector, TransformError> {
    let normalized = normalize_selector(spec);
    if normalized.is_empty() {
        return Err(TransformError::SelectorError {
            selector: spec.to_string(),
            message: "empty selector".to_string(),
        });
    }
    Selector::parse(&normalized).map_err(|err| TransformError::SelectorError {
        selector: spec.to_string(),
        message: err.to_string(),
    })
}

pub fn compile_all(specs: &[String]) -> Result<Vec<Selector>, TransformError> {
    specs
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| compile(s))
        .collect()
}

pub fn matches<'a>(document: &'a Html, selector: &Selector) -> Vec<ElementRef<'a>> {
    document.select(selector).collect()
}

/// Selectors the crate itself relies on. They are static strings, so a parse
/// failure is a programming error surfaced as "no match".
pub(crate) fn builtin(spec: &str) -> Option<Selector> {
    Selector::parse(spec).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_get_class_prefix() {
        assert_eq!(normalize_selector("blog-post"), ".blog-post");
        assert_eq!(normalize_selector("  sidebar "), ".sidebar");
    }

    #[test]
    fn tags_and_css_are_left_alone() {
        assert_eq!(normalize_selector("article"), "article");
        assert_eq!(normalize_selector("div.post"), "div.post");
        assert_eq!(normalize_selector("#comments"), "#comments");
        assert_eq!(normalize_selector("[data-type=post]"), "[data-type=post]");
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = compile("div[").unwrap_err();
        assert!(matches!(err, TransformError::SelectorError { .. }));
    }

    #[test]
    fn matches_returns_all_elements() {
        let doc = Html::parse_document("<div class='x'></div><p class='x'></p>");
        let sel = compile("x").unwrap();
        assert_eq!(matches(&doc, &sel).len(), 2);
    }
}
