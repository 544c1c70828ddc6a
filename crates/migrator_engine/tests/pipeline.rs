use std::fs;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use migrator_core::{ContentType, UrlEntry};
use migrator_engine::{
    FetchError, FetchFailureKind, FetchSettings, FetchedPage, Fetcher, NoopImageTools, Pipeline,
    PipelineConfig, PipelineError, PipelineEvent, ProgressSink, Stage, CLASSIFICATION_REPORT,
    CLEAN_DIR, IMAGES_DIR, MAPPING_FILE, RAW_DIR,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct TestSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl ProgressSink for TestSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Serves canned pages keyed by URL; anything else fails.
struct SiteFetcher {
    pages: Vec<(String, String)>,
}

#[async_trait::async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.pages
            .iter()
            .find(|(known, _)| known == url)
            .map(|(_, html)| FetchedPage {
                final_url: url.to_string(),
                html: html.clone(),
                content_type: Some("text/html".into()),
            })
            .ok_or(FetchError {
                kind: FetchFailureKind::NavigationFailed,
                message: "http status 404".into(),
            })
    }
}

fn config(output: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig {
        output_dir: output.path().join("migration"),
        fetch: FetchSettings {
            max_retries: 0,
            delay_between_ms: 0,
            ..FetchSettings::default()
        },
        ..PipelineConfig::default()
    };
    config.assets.max_retries = 0;
    config.assets.retry_delay_ms = 0;
    config
}

#[tokio::test]
async fn full_run_writes_every_artifact() {
    let images = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/truck.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpeg".to_vec(), "image/jpeg"))
        .mount(&images)
        .await;

    let post_url = "https://example.com/blog/2024/05/first-tow";
    let page_url = "https://example.com/services/towing";
    let post_html = format!(
        r#"<html><head><title>First Tow | Joe's Towing</title></head><body>
        <header><nav>Home</nav></header>
        <article><time datetime="2024-05-02">May 2</time>
        <p>Our first tow of the season.</p>
        <p><img src="{}/img/truck.jpg" alt="Truck"></p></article>
        <footer>Copyright</footer></body></html>"#,
        images.uri()
    );
    let page_html = r#"<html><body><h1>Towing Services</h1><p>We tow anything.</p></body></html>"#;
    let fetcher = SiteFetcher {
        pages: vec![
            (post_url.to_string(), post_html),
            (page_url.to_string(), page_html.to_string()),
        ],
    };
    let entries = vec![
        UrlEntry::with_hint(post_url, ContentType::Post),
        UrlEntry::new("https://example.com/broken"),
        UrlEntry::with_hint(page_url, ContentType::Page),
    ];

    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let out = config.output_dir.clone();
    let sink = TestSink::default();
    let report = Pipeline::new(config)
        .with_fetcher(Arc::new(fetcher))
        .with_image_tools(Arc::new(NoopImageTools), Arc::new(NoopImageTools))
        .with_clock(|| {
            NaiveDate::from_ymd_opt(2024, 7, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap()
        })
        .run(&entries, &sink)
        .await
        .unwrap();

    assert_eq!(report.fetch.summary.succeeded, 2);
    assert_eq!(report.fetch.summary.failed, 1);
    assert_eq!(report.sanitize.summary.succeeded, 2);
    assert_eq!(report.assets.summary.succeeded, 1);
    assert_eq!(report.export.row_count, 2);
    assert_eq!(report.export.posts, 1);

    let post_id = &report.fetch.documents[0].source_id;
    assert!(out.join(RAW_DIR).join(post_id).is_file());
    let clean = fs::read_to_string(out.join(CLEAN_DIR).join(post_id)).unwrap();
    assert!(!clean.contains("Copyright"));
    assert!(!clean.contains("<nav"));

    assert!(out
        .join(IMAGES_DIR)
        .join("first-tow_truck.jpg")
        .is_file());
    assert!(out.join(MAPPING_FILE).is_file());

    let classification: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(CLASSIFICATION_REPORT)).unwrap())
            .unwrap();
    assert_eq!(classification[0]["type"], "post");
    assert_eq!(classification[0]["confidence"], 100);
    assert_eq!(classification[1]["type"], "page");

    let csv = fs::read_to_string(&report.export.output_path).unwrap();
    let lines: Vec<&str> = csv.split("\r\n").collect();
    assert!(lines[1].starts_with(r#""First Tow","#));
    assert!(lines[1].contains(r#"src=""/wp-content/uploads/migrated/first-tow_truck.jpg"""#));
    assert!(lines[1].contains(r#""post","publish","2024-05-02 00:00:00","first-tow""#));
    assert!(lines[2].starts_with(r#""Towing Services","#));
    assert!(lines[2].contains(r#""page","publish","2024-07-01 12:00:00","towing""#));

    let completed: Vec<Stage> = sink
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageCompleted(summary) => Some(summary.stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        completed,
        vec![Stage::Fetch, Stage::Sanitize, Stage::Assets, Stage::Export]
    );
}

#[tokio::test]
async fn empty_url_list_is_rejected() {
    let temp = TempDir::new().unwrap();
    let err = Pipeline::new(config(&temp))
        .run(&[], &TestSink::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoInputUrls));
}

#[tokio::test]
async fn invalid_selector_stops_before_fetching() {
    let temp = TempDir::new().unwrap();
    let mut config = config(&temp);
    config.sanitize.remove_selectors.push("div[".into());
    let fetcher = SiteFetcher { pages: Vec::new() };
    let sink = TestSink::default();

    let err = Pipeline::new(config)
        .with_fetcher(Arc::new(fetcher))
        .run(&[UrlEntry::new("https://example.com/")], &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Config(_)));
    assert!(sink.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn nothing_fetched_means_nothing_to_export() {
    let temp = TempDir::new().unwrap();
    let err = Pipeline::new(config(&temp))
        .with_fetcher(Arc::new(SiteFetcher { pages: Vec::new() }))
        .with_image_tools(Arc::new(NoopImageTools), Arc::new(NoopImageTools))
        .run(&[UrlEntry::new("https://example.com/gone")], &TestSink::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Export(migrator_engine::ExportError::NoInputDocuments)
    ));
}
