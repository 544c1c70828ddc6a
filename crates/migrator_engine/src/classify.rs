use std::collections::BTreeMap;

use migrator_core::{source_id_for_url, ClassificationVerdict, ContentType, UrlEntry};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::selector::{builtin, compile, matches};
use crate::TransformError;

const DEFAULT_POST_KEYWORDS: &[&str] = &[
    "posted on",
    "posted by",
    "published on",
    "written by",
    "leave a comment",
    "leave a reply",
    "comments",
    "read more",
    "share this",
    "filed under",
    "tags:",
    "categories:",
    "min read",
    "previous post",
    "next post",
];

const DEFAULT_PAGE_KEYWORDS: &[&str] = &[
    "contact us",
    "about us",
    "our team",
    "our services",
    "our mission",
    "get in touch",
    "request a quote",
    "call us",
    "privacy policy",
    "terms of service",
    "terms and conditions",
    "frequently asked questions",
    "opening hours",
];

/// `{ "post": "<selector>", "page": "<selector>", "manual": { "<source_id>": "post" } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub post: Option<String>,
    pub page: Option<String>,
    pub manual: BTreeMap<String, ContentType>,
    pub post_keywords: Vec<String>,
    pub page_keywords: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            post: None,
            page: None,
            manual: BTreeMap::new(),
            post_keywords: DEFAULT_POST_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            page_keywords: DEFAULT_PAGE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClassificationConfig {
    /// Fold URL-list type hints into the manual mapping. Entries already in
    /// the mapping are left as configured.
    pub fn with_type_hints(mut self, entries: &[UrlEntry]) -> Self {
        for entry in entries {
            let (Some(hint), Some(source_id)) = (entry.type_hint, source_id_for_url(&entry.url))
            else {
                continue;
            };
            self.manual.entry(source_id).or_insert(hint);
        }
        self
    }
}

#[derive(Debug)]
pub struct Classifier {
    config: ClassificationConfig,
    post_selector: Option<Selector>,
    page_selector: Option<Selector>,
    body_selector: Option<Selector>,
}

impl Classifier {
    pub fn new(config: ClassificationConfig) -> Result<Self, TransformError> {
        let post_selector = configured(config.post.as_deref()).map(compile).transpose()?;
        let page_selector = configured(config.page.as_deref()).map(compile).transpose()?;
        Ok(Self {
            config,
            post_selector,
            page_selector,
            body_selector: builtin("body"),
        })
    }

    /// First matching rule wins: manual mapping, post selector, page selector,
    /// absence of the only configured selector, keyword scoring, default.
    pub fn classify(&self, source_id: &str, document: &Html) -> ClassificationVerdict {
        if let Some(content_type) = self.config.manual.get(source_id) {
            return ClassificationVerdict::new(*content_type, 100, "manual mapping");
        }

        let post_hit = self
            .post_selector
            .as_ref()
            .map(|sel| !matches(document, sel).is_empty());
        let page_hit = self
            .page_selector
            .as_ref()
            .map(|sel| !matches(document, sel).is_empty());

        if post_hit == Some(true) {
            return ClassificationVerdict::new(ContentType::Post, 95, "post selector matched");
        }
        if page_hit == Some(true) {
            return ClassificationVerdict::new(ContentType::Page, 95, "page selector matched");
        }
        match (post_hit, page_hit) {
            (Some(false), None) => {
                return ClassificationVerdict::new(
                    ContentType::Page,
                    80,
                    "post selector configured but not matched",
                );
            }
            (None, Some(false)) => {
                return ClassificationVerdict::new(
                    ContentType::Post,
                    80,
                    "page selector configured but not matched",
                );
            }
            _ => {}
        }

        let text = self.body_text(document).to_lowercase();
        let post_score = keyword_score(&text, &self.config.post_keywords);
        let page_score = keyword_score(&text, &self.config.page_keywords);
        if post_score != page_score {
            let margin = post_score.abs_diff(page_score);
            let confidence = (60 + 10 * margin).min(100) as u8;
            let (content_type, winner, loser) = if post_score > page_score {
                (ContentType::Post, post_score, page_score)
            } else {
                (ContentType::Page, page_score, post_score)
            };
            return ClassificationVerdict::new(
                content_type,
                confidence,
                format!("keyword score {winner} vs {loser}"),
            );
        }

        ClassificationVerdict::new(ContentType::Post, 50, "no signal; defaulting to post")
    }

    fn body_text(&self, document: &Html) -> String {
        let body = self
            .body_selector
            .as_ref()
            .and_then(|sel| document.select(sel).next());
        match body {
            Some(body) => body.text().collect::<Vec<_>>().join(" "),
            None => document.root_element().text().collect::<Vec<_>>().join(" "),
        }
    }
}

fn configured(spec: Option<&str>) -> Option<&str> {
    spec.filter(|s| !s.trim().is_empty())
}

/// Number of distinct phrases present in `text`.
fn keyword_score(text: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(config: ClassificationConfig, html: &str) -> ClassificationVerdict {
        let classifier = Classifier::new(config).unwrap();
        classifier.classify("example.com_x.html", &Html::parse_document(html))
    }

    #[test]
    fn manual_mapping_wins() {
        let mut config = ClassificationConfig {
            post: Some("article".into()),
            ..ClassificationConfig::default()
        };
        config
            .manual
            .insert("example.com_x.html".into(), ContentType::Page);
        let verdict = classify(config, "<article>Posted on Monday</article>");
        assert_eq!(verdict.content_type, ContentType::Page);
        assert_eq!(verdict.confidence, 100);
    }

    #[test]
    fn missing_only_post_selector_means_page() {
        let config = ClassificationConfig {
            post: Some("blog-post".into()),
            ..ClassificationConfig::default()
        };
        let verdict = classify(config, "<p>Posted on Monday, leave a comment</p>");
        assert_eq!(verdict.content_type, ContentType::Page);
        assert_eq!(verdict.confidence, 80);
    }

    #[test]
    fn missing_only_page_selector_means_post() {
        let config = ClassificationConfig {
            page: Some("service-page".into()),
            ..ClassificationConfig::default()
        };
        let verdict = classify(config, "<p>Contact us</p>");
        assert_eq!(verdict.content_type, ContentType::Post);
        assert_eq!(verdict.confidence, 80);
    }

    #[test]
    fn both_selectors_unmatched_fall_through_to_keywords() {
        let config = ClassificationConfig {
            post: Some("blog-post".into()),
            page: Some("service-page".into()),
            ..ClassificationConfig::default()
        };
        let verdict = classify(config, "<p>Contact us. About us. Our team.</p>");
        assert_eq!(verdict.content_type, ContentType::Page);
        assert_eq!(verdict.confidence, 90);
    }

    #[test]
    fn keyword_margin_sets_confidence() {
        let verdict = classify(
            ClassificationConfig::default(),
            "<p>Posted on Monday by Sam. Leave a comment below.</p>",
        );
        assert_eq!(verdict.content_type, ContentType::Post);
        assert_eq!(verdict.confidence, 80);
    }

    #[test]
    fn wide_keyword_margin_reaches_full_confidence() {
        let verdict = classify(
            ClassificationConfig::default(),
            "<p>Contact us. About us. Our team. Our services.</p>",
        );
        assert_eq!(verdict.content_type, ContentType::Page);
        assert_eq!(verdict.confidence, 100);
        assert_eq!(verdict.reason, "keyword score 4 vs 0");

        let verdict = classify(
            ClassificationConfig::default(),
            "<p>Contact us. About us. Our team. Our services. Call us today.</p>",
        );
        assert_eq!(verdict.confidence, 100);
    }

    #[test]
    fn type_hints_do_not_override_configured_mapping() {
        let mut config = ClassificationConfig::default();
        config
            .manual
            .insert("example.com_a.html".into(), ContentType::Post);
        let config = config.with_type_hints(&[
            UrlEntry::with_hint("https://example.com/a", ContentType::Page),
            UrlEntry::with_hint("https://example.com/b", ContentType::Page),
            UrlEntry::new("https://example.com/c"),
        ]);
        assert_eq!(config.manual.get("example.com_a.html"), Some(&ContentType::Post));
        assert_eq!(config.manual.get("example.com_b.html"), Some(&ContentType::Page));
        assert_eq!(config.manual.len(), 2);
    }

    #[test]
    fn no_signal_defaults_to_post() {
        let verdict = classify(ClassificationConfig::default(), "<p>Trucks.</p>");
        assert_eq!(verdict.content_type, ContentType::Post);
        assert_eq!(verdict.confidence, 50);
    }
}
