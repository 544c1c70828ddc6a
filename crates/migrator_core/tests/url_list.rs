use std::sync::Once;

use migrator_core::{parse_url_list, ContentType, UrlEntry};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

#[test]
fn url_list_reads_hints_and_skips_comments() {
    init_logging();
    let input = "\
# pages to migrate
https://example.com/about page

https://example.com/blog/2024/first-post.html POST
   https://example.com/contact   \n";

    let parsed = parse_url_list(input);
    assert_eq!(
        parsed.entries,
        vec![
            UrlEntry::with_hint("https://example.com/about", ContentType::Page),
            UrlEntry::with_hint(
                "https://example.com/blog/2024/first-post.html",
                ContentType::Post
            ),
            UrlEntry::new("https://example.com/contact"),
        ]
    );
    assert_eq!(parsed.skipped_invalid, 0);
    assert_eq!(parsed.skipped_duplicates, 0);
}

#[test]
fn duplicates_keep_first_occurrence() {
    init_logging();
    let input = "https://example.com/a post\nhttps://EXAMPLE.com/a/ page\nhttps://example.com/a#x\n";

    let parsed = parse_url_list(input);
    assert_eq!(
        parsed.entries,
        vec![UrlEntry::with_hint("https://example.com/a", ContentType::Post)]
    );
    assert_eq!(parsed.skipped_duplicates, 2);
}

#[test]
fn invalid_lines_and_unknown_hints_are_counted() {
    init_logging();
    let input = "not-a-url\nmailto:someone@example.com\nhttps://example.com/x article\n";

    let parsed = parse_url_list(input);
    assert_eq!(parsed.entries, vec![UrlEntry::new("https://example.com/x")]);
    assert_eq!(parsed.skipped_invalid, 2);
    assert_eq!(parsed.unknown_hints, 1);
}

#[test]
fn empty_input_yields_nothing() {
    let parsed = parse_url_list("\n   \n# only a comment\n");
    assert!(parsed.entries.is_empty());
}
