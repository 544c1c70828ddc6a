use std::fs;

use chrono::NaiveDate;
use migrator_core::{ClassificationVerdict, ContentType};
use migrator_engine::{
    csv_field, serialize_rows, CleanDocument, ExportError, ExportOptions, ExportRow, Exporter,
    ImageRecord, LogSink, RawDocument,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixed_clock() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, 1)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap()
}

fn documents(
    source_id: &str,
    url: &str,
    raw_html: &str,
    clean_html: &str,
    content_type: ContentType,
) -> (RawDocument, CleanDocument) {
    (
        RawDocument {
            source_id: source_id.into(),
            url: url.into(),
            html: raw_html.into(),
            fetched_at: "2024-07-01T00:00:00Z".into(),
        },
        CleanDocument {
            source_id: source_id.into(),
            url: url.into(),
            html: clean_html.into(),
            verdict: ClassificationVerdict::new(content_type, 95, "test"),
        },
    )
}

#[test]
fn embedded_quotes_are_doubled() {
    assert_eq!(csv_field(r#"He said "hi""#), r#""He said ""hi""""#);
}

#[test]
fn rows_are_quoted_with_crlf_endings() {
    let row = ExportRow {
        title: "Tow, Fast".into(),
        slug: "tow-fast".into(),
        content: "<p>a\nb</p>".into(),
        excerpt: "a b".into(),
        content_type: ContentType::Page,
        status: "draft".into(),
        date: "2024-01-02 03:04:05".into(),
        category: String::new(),
    };
    let csv = serialize_rows(&[row]);
    assert_eq!(
        csv,
        "\"title\",\"content\",\"type\",\"status\",\"date\",\"slug\",\"excerpt\",\"category\"\r\n\
         \"Tow, Fast\",\"<p>a\nb</p>\",\"page\",\"draft\",\"2024-01-02 03:04:05\",\"tow-fast\",\"a b\",\"\"\r\n"
    );
}

#[test]
fn row_uses_raw_title_and_date_and_path_slug() {
    let (raw, clean) = documents(
        "www.example.com_blog_2025_march_03_best-trucks.html",
        "https://www.example.com/blog/2025/march/03/best-trucks",
        r#"<html><head><title>Best Trucks | Example Towing</title></head><body>
           <p class="post-date">March 8, 2023</p></body></html>"#,
        "<p></p><p>Our   favourite trucks\nof the year.</p>",
        ContentType::Post,
    );
    let exporter = Exporter::new(ExportOptions::default()).with_clock(fixed_clock);

    let row = exporter.build_row(&clean, Some(&raw), &[]);
    assert_eq!(row.title, "Best Trucks");
    assert_eq!(row.slug, "best-trucks");
    assert_eq!(row.date, "2023-03-08 00:00:00");
    assert_eq!(row.excerpt, "Our favourite trucks of the year.");
    assert_eq!(row.category, "Uncategorized");
    assert_eq!(row.status, "publish");
}

#[test]
fn missing_date_falls_back_to_clock() {
    let (raw, clean) = documents(
        "example.com_index.html",
        "https://example.com/",
        "<html><body><h1>Welcome Home</h1></body></html>",
        "<h1>Welcome Home</h1>",
        ContentType::Page,
    );
    let exporter = Exporter::new(ExportOptions::default()).with_clock(fixed_clock);

    let row = exporter.build_row(&clean, Some(&raw), &[]);
    assert_eq!(row.date, "2024-07-01 09:30:00");
    assert_eq!(row.slug, "welcome-home");
    assert_eq!(row.category, "");
}

#[test]
fn missing_date_uses_current_time_by_default() {
    let (raw, clean) = documents(
        "example.com_about.html",
        "https://example.com/about",
        "<html><body><p>No dates here.</p></body></html>",
        "<p>No dates here.</p>",
        ContentType::Page,
    );
    let before = chrono::Local::now().naive_local() - chrono::Duration::seconds(1);
    let row = Exporter::new(ExportOptions::default()).build_row(&clean, Some(&raw), &[]);
    let after = chrono::Local::now().naive_local() + chrono::Duration::seconds(1);

    let parsed = chrono::NaiveDateTime::parse_from_str(&row.date, "%Y-%m-%d %H:%M:%S").unwrap();
    assert!(parsed >= before && parsed <= after);
}

#[test]
fn downloaded_images_are_pointed_at_local_files() {
    let (raw, clean) = documents(
        "example.com_fleet.html",
        "https://example.com/fleet/",
        "<html><body></body></html>",
        r#"<p><img alt="Truck" src="img/truck.png"></p><p><img src="https://cdn.example.net/skip.png"></p>"#,
        ContentType::Post,
    );
    let record = ImageRecord {
        original_url: "https://example.com/fleet/img/truck.png".into(),
        local_filename: "fleet_truck.png".into(),
        article_slug: "fleet".into(),
        source_id: "example.com_fleet.html".into(),
        size_bytes: 10,
        alt_text: "Truck".into(),
        skipped: false,
        format_converted: false,
        original_format: None,
        metadata_embedded: false,
        error: None,
    };
    let exporter = Exporter::new(ExportOptions {
        image_base_url: "https://new.example.com/media/".into(),
        ..ExportOptions::default()
    });

    let row = exporter.build_row(&clean, Some(&raw), &[&record]);
    assert_eq!(
        row.content,
        r#"<p><img alt="Truck" src="https://new.example.com/media/fleet_truck.png"></p><p><img src="https://cdn.example.net/skip.png"></p>"#
    );
}

#[test]
fn export_writes_file_and_manifest() {
    let temp = TempDir::new().unwrap();
    let (raw_a, clean_a) = documents(
        "example.com_services_towing.html",
        "https://example.com/services/towing",
        "<html><body><h1>Towing</h1></body></html>",
        "<p>We tow.</p>",
        ContentType::Page,
    );
    let (raw_b, clean_b) = documents(
        "example.com_blog_news.html",
        "https://example.com/blog/news",
        r#"<html><body><h1 class="entry-title">He said "hi"</h1></body></html>"#,
        "<p>News.</p>",
        ContentType::Post,
    );
    let exporter = Exporter::new(ExportOptions::default()).with_clock(fixed_clock);

    let summary = exporter
        .export(
            &[clean_a, clean_b],
            &[raw_a, raw_b],
            &[],
            temp.path(),
            &LogSink,
        )
        .unwrap();

    assert_eq!(summary.row_count, 2);
    assert_eq!(summary.posts, 1);
    assert_eq!(summary.pages, 1);
    let csv = fs::read_to_string(&summary.output_path).unwrap();
    let lines: Vec<&str> = csv.split("\r\n").collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with(r#""Towing","<p>We tow.</p>","page","publish""#));
    assert!(lines[2].starts_with(r#""He said ""hi""","<p>News.</p>","post""#));
    assert_eq!(lines[3], "");

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(summary.manifest_path.unwrap()).unwrap())
            .unwrap();
    assert_eq!(manifest[0]["slug"], "towing");
    assert_eq!(manifest[1]["type"], "post");
}

#[test]
fn nothing_to_export_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = Exporter::new(ExportOptions::default())
        .export(&[], &[], &[], temp.path(), &LogSink)
        .unwrap_err();
    assert!(matches!(err, ExportError::NoInputDocuments));
}
