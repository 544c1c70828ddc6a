use std::sync::{Arc, Mutex};

use migrator_core::{ContentType, UrlEntry};
use migrator_engine::{
    ClassificationConfig, ContentStore, PipelineEvent, ProgressSink, RawDocument, SanitizeOptions,
    Sanitizer, Stage, TransformError,
};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct TestSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl ProgressSink for TestSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn raw(source_id: &str, html: &str) -> RawDocument {
    RawDocument {
        source_id: source_id.to_string(),
        url: "https://www.example.com/blog/2025/march/03/best-trucks".to_string(),
        html: html.to_string(),
        fetched_at: "2025-03-04T08:00:00Z".to_string(),
    }
}

const WORD_LIST: &str = r#"<html><body>
<p class="MsoNormal">Our fleet:</p>
<p class="MsoListParagraphCxSpFirst" style="margin-left:.5in;text-indent:-.25in;mso-list:l0 level1 lfo1"><span style="font-family:Symbol;mso-fareast-font-family:Symbol"><span style="mso-list:Ignore">·<span style="font:7.0pt &quot;Times New Roman&quot;">&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;</span></span></span>Flatbeds</p>
<p class="MsoListParagraphCxSpMiddle" style="margin-left:.5in;text-indent:-.25in;mso-list:l0 level1 lfo1"><span style="font-family:Symbol"><span style="mso-list:Ignore">·<span>&nbsp;&nbsp;</span></span></span>Wreckers</p>
<p class="MsoListParagraphCxSpLast" style="margin-left:.5in;text-indent:-.25in;mso-list:l0 level1 lfo1"><span style="font-family:Symbol"><span style="mso-list:Ignore">·<span>&nbsp;&nbsp;</span></span></span>Rotators</p>
</body></html>"#;

#[test]
fn office_bullet_paragraphs_become_one_list() {
    let sanitizer = Sanitizer::new(SanitizeOptions::default()).unwrap();
    let clean = sanitizer
        .sanitize(&raw("www.example.com_fleet.html", WORD_LIST))
        .unwrap();

    assert_eq!(clean.html.matches("<ul").count(), 1);
    assert_eq!(clean.html.matches("<li").count(), 3);
    assert!(!clean.html.contains('·'));
    assert!(!clean.html.contains("<li><p"));
    assert!(!clean.html.contains("mso-"));
    assert!(!clean.html.contains("class="));
    assert!(clean.html.contains(r#"<p style="margin-top: 0; margin-bottom: 1em">Our fleet:</p>"#));
    assert!(clean
        .html
        .ends_with("<ul style=\"margin-top: 0; margin-bottom: 1em\"><li>Flatbeds</li><li>Wreckers</li><li>Rotators</li></ul>"));
}

#[test]
fn selector_match_beats_keyword_heuristic() {
    let options = SanitizeOptions {
        classification: ClassificationConfig {
            page: Some("service-page".into()),
            ..ClassificationConfig::default()
        },
        ..SanitizeOptions::default()
    };
    let sanitizer = Sanitizer::new(options).unwrap();
    let html = r#"<html><body><div class="service-page">
        <p>Posted on May 2, 2024 by Dispatch. Leave a comment. Read more. Share this. Filed under towing.</p>
    </div></body></html>"#;

    let clean = sanitizer.sanitize(&raw("example.com_towing.html", html)).unwrap();
    assert_eq!(clean.verdict.content_type, ContentType::Page);
    assert_eq!(clean.verdict.confidence, 95);
}

#[test]
fn url_hint_is_a_manual_mapping() {
    let entries = vec![UrlEntry::with_hint(
        "https://example.com/towing",
        ContentType::Page,
    )];
    let options = SanitizeOptions {
        classification: ClassificationConfig::default().with_type_hints(&entries),
        ..SanitizeOptions::default()
    };
    let sanitizer = Sanitizer::new(options).unwrap();

    let clean = sanitizer
        .sanitize(&raw("example.com_towing.html", "<p>Posted by Sam. Leave a reply.</p>"))
        .unwrap();
    assert_eq!(clean.verdict.content_type, ContentType::Page);
    assert_eq!(clean.verdict.confidence, 100);
}

#[test]
fn verdict_is_stable_for_identical_input() {
    let sanitizer = Sanitizer::new(SanitizeOptions::default()).unwrap();
    let doc = raw("example.com_news.html", "<p>Written by Ana. Tags: trucks</p>");
    let first = sanitizer.sanitize(&doc).unwrap();
    let second = sanitizer.sanitize(&doc).unwrap();
    assert_eq!(first, second);
}

#[test]
fn invalid_classification_selector_is_reported_up_front() {
    let options = SanitizeOptions {
        classification: ClassificationConfig {
            post: Some("article[".into()),
            ..ClassificationConfig::default()
        },
        ..SanitizeOptions::default()
    };
    let err = Sanitizer::new(options).unwrap_err();
    assert!(matches!(err, TransformError::SelectorError { selector, .. } if selector == "article["));
}

#[test]
fn sanitize_all_continues_past_failures() {
    let temp = tempfile::tempdir().unwrap();
    let store = ContentStore::new(temp.path().join("clean"));
    let sink = TestSink::default();
    let sanitizer = Sanitizer::new(SanitizeOptions::default()).unwrap();
    let docs = vec![
        raw("example.com_a.html", "<p>A</p>"),
        raw("example.com_empty.html", "  "),
        raw("example.com_b.html", "<p>B</p>"),
    ];

    let report = sanitizer.sanitize_all(&docs, Some(&store), &sink);

    assert_eq!(report.documents.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_id, "example.com_empty.html");
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(
        store.read("example.com_b.html").unwrap(),
        r#"<p style="margin-top: 0; margin-bottom: 1em">B</p>"#
    );
    let events = sink.events.lock().unwrap();
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::StageCompleted(summary)) if summary.stage == Stage::Sanitize
    ));
}
