use std::collections::{BTreeMap, HashSet};

use engine_logging::engine_debug;
use log::Level;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::assets::pick_image_source;
use crate::classify::{ClassificationConfig, Classifier};
use crate::dom::{self, DomElement, DomNode};
use crate::lists::convert_list_runs;
use crate::persist::ContentStore;
use crate::progress::{complete, report, ProgressSink};
use crate::selector::{builtin, compile_all};
use crate::style::{self, Declaration};
use crate::{CleanDocument, RawDocument, Stage, StageSummary, TransformError};

/// Markup that never carries article content.
const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg", "form",
    "button", "input", "link", "meta",
];

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeOptions {
    /// Elements removed with their whole subtree.
    pub remove_selectors: Vec<String>,
    pub classification: ClassificationConfig,
    /// Substring pattern to replacement path.
    pub link_rewrites: BTreeMap<String, String>,
    /// Bottom margin applied to block elements.
    pub spacing: String,
    /// Classes kept on elements. A trailing `*` matches by prefix.
    pub layout_classes: Vec<String>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            remove_selectors: [
                "header",
                "nav",
                "footer",
                "aside",
                ".sidebar",
                ".widget",
                ".comments",
                "#comments",
                ".comment-respond",
                ".share",
                ".sharedaddy",
                ".social",
                ".breadcrumb",
                ".breadcrumbs",
                ".related-posts",
                ".cookie-notice",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            classification: ClassificationConfig::default(),
            link_rewrites: BTreeMap::new(),
            spacing: "1em".to_string(),
            layout_classes: [
                "row",
                "col-*",
                "columns",
                "column",
                "container",
                "grid",
                "wp-block-columns",
                "wp-block-column",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeFailure {
    pub source_id: String,
    pub error: TransformError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeReport {
    pub documents: Vec<CleanDocument>,
    pub failures: Vec<SanitizeFailure>,
    pub summary: StageSummary,
}

/// Compiled sanitization and classification rules.
///
/// Selector errors surface from [`Sanitizer::new`]; after that only empty
/// documents fail.
#[derive(Debug)]
pub struct Sanitizer {
    options: SanitizeOptions,
    classifier: Classifier,
    remove: Vec<Selector>,
    body: Option<Selector>,
    /// Longest pattern first.
    rewrites: Vec<(String, String)>,
}

impl Sanitizer {
    pub fn new(options: SanitizeOptions) -> Result<Self, TransformError> {
        let classifier = Classifier::new(options.classification.clone())?;
        let remove = compile_all(&options.remove_selectors)?;
        let mut rewrites: Vec<(String, String)> = options
            .link_rewrites
            .iter()
            .filter(|(pattern, _)| !pattern.is_empty())
            .map(|(pattern, path)| (pattern.clone(), path.clone()))
            .collect();
        rewrites.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self {
            options,
            classifier,
            remove,
            body: builtin("body"),
            rewrites,
        })
    }

    pub fn options(&self) -> &SanitizeOptions {
        &self.options
    }

    pub fn sanitize(&self, doc: &RawDocument) -> Result<CleanDocument, TransformError> {
        if doc.html.trim().is_empty() {
            return Err(TransformError::ParseFailure {
                source_id: doc.source_id.clone(),
                message: "document is empty".to_string(),
            });
        }
        let document = Html::parse_document(&doc.html);
        if !document.errors.is_empty() {
            engine_debug!(
                "{}: {} recoverable parse errors",
                doc.source_id,
                document.errors.len()
            );
        }

        let verdict = self.classifier.classify(&doc.source_id, &document);

        let skip: HashSet<_> = self
            .remove
            .iter()
            .flat_map(|sel| document.select(sel))
            .map(|el| el.id())
            .collect();
        let root = self
            .body
            .as_ref()
            .and_then(|sel| document.select(sel).next())
            .unwrap_or_else(|| document.root_element());
        let mut nodes = dom::copy_children(root, &skip, NON_CONTENT_TAGS);

        self.rewrite_links(&mut nodes);
        // List detection reads office classes, so it runs before the
        // attribute filter drops them.
        convert_list_runs(&mut nodes);
        dom::walk_mut(&mut nodes, &mut |el: &mut DomElement| {
            filter_attributes(el, &self.options.layout_classes)
        });
        normalize_spacing(&mut nodes, &self.options.spacing, false);
        dom::walk_mut(&mut nodes, &mut |el: &mut DomElement| {
            el.attrs.sort_by(|a, b| a.0.cmp(&b.0))
        });

        Ok(CleanDocument {
            source_id: doc.source_id.clone(),
            url: doc.url.clone(),
            html: dom::serialize(&nodes).trim().to_string(),
            verdict,
        })
    }

    /// Sanitize every document independently. Clean markup is written to
    /// `store` when given.
    pub fn sanitize_all(
        &self,
        docs: &[RawDocument],
        store: Option<&ContentStore>,
        sink: &dyn ProgressSink,
    ) -> SanitizeReport {
        let mut summary = StageSummary::new(Stage::Sanitize);
        let mut documents = Vec::with_capacity(docs.len());
        let mut failures = Vec::new();

        for doc in docs {
            match self.sanitize(doc) {
                Ok(clean) => {
                    report(
                        sink,
                        Level::Info,
                        Stage::Sanitize,
                        format!(
                            "{}: {} ({}%, {})",
                            clean.source_id,
                            clean.verdict.content_type,
                            clean.verdict.confidence,
                            clean.verdict.reason
                        ),
                    );
                    if let Some(store) = store {
                        if let Err(err) = store.write(&clean.source_id, &clean.html) {
                            report(
                                sink,
                                Level::Warn,
                                Stage::Sanitize,
                                format!("{}: could not store clean document: {err}", clean.source_id),
                            );
                        }
                    }
                    documents.push(clean);
                    summary.succeeded += 1;
                }
                Err(error) => {
                    report(sink, Level::Error, Stage::Sanitize, error.to_string());
                    failures.push(SanitizeFailure {
                        source_id: doc.source_id.clone(),
                        error,
                    });
                    summary.failed += 1;
                }
            }
        }

        complete(sink, summary);
        SanitizeReport {
            documents,
            failures,
            summary,
        }
    }

    fn rewrite_links(&self, nodes: &mut [DomNode]) {
        if self.rewrites.is_empty() {
            return;
        }
        dom::walk_mut(nodes, &mut |el: &mut DomElement| {
            if !el.is("a") {
                return;
            }
            let target = el.attr("href").and_then(|href| {
                self.rewrites
                    .iter()
                    .find(|(pattern, _)| href.contains(pattern.as_str()))
                    .map(|(_, path)| path.clone())
            });
            if let Some(path) = target {
                el.set_attr("href", path);
            }
        });
    }
}

fn filter_attributes(el: &mut DomElement, layout_classes: &[String]) {
    let tag = el.name.clone();
    if tag == "img" {
        let current: &DomElement = el;
        if let Some(source) = pick_image_source(|name| current.attr(name)).map(str::to_string) {
            el.set_attr("src", source);
        }
    }
    let attrs = std::mem::take(&mut el.attrs);
    for (name, value) in attrs {
        let keep = match name.as_str() {
            "style" => !value.trim().is_empty(),
            "href" | "target" => tag == "a",
            "src" | "alt" | "width" | "height" => tag == "img",
            "colspan" | "rowspan" => tag == "td" || tag == "th",
            "class" => {
                let kept: Vec<&str> = value
                    .split_whitespace()
                    .filter(|class| is_layout_class(class, layout_classes))
                    .collect();
                if !kept.is_empty() {
                    el.attrs.push((name.clone(), kept.join(" ")));
                }
                false
            }
            _ => false,
        };
        if keep {
            el.attrs.push((name, value));
        }
    }
}

fn is_layout_class(class: &str, layout_classes: &[String]) -> bool {
    layout_classes.iter().any(|entry| match entry.strip_suffix('*') {
        Some(prefix) => class.starts_with(prefix),
        None => class == entry,
    })
}

fn normalize_spacing(nodes: &mut [DomNode], spacing: &str, in_item: bool) {
    for node in nodes {
        if let DomNode::Element(el) = node {
            if is_spacing_target(el, in_item) {
                apply_spacing(el, spacing);
            }
            let inside = in_item || el.is("li");
            normalize_spacing(&mut el.children, spacing, inside);
        }
    }
}

fn is_spacing_target(el: &DomElement, in_item: bool) -> bool {
    match el.name.as_str() {
        "p" => !in_item,
        "table" | "img" | "ul" | "ol" | "blockquote" => true,
        "div" => el
            .children
            .iter()
            .any(|child| matches!(child, DomNode::Text(t) if !t.trim().is_empty())),
        name => HEADINGS.contains(&name),
    }
}

fn apply_spacing(el: &mut DomElement, spacing: &str) {
    let mut decls = style::strip_vertical_margins(style::parse(el.attr("style").unwrap_or_default()));
    decls.push(Declaration {
        property: "margin-top".to_string(),
        value: "0".to_string(),
    });
    decls.push(Declaration {
        property: "margin-bottom".to_string(),
        value: spacing.to_string(),
    });
    el.set_attr("style", style::render(&decls));
}
