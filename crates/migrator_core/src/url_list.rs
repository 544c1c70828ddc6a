use std::collections::HashSet;

use url::Url;

use crate::{ContentType, UrlEntry};

/// Result of parsing a newline-delimited URL list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlListParse {
    pub entries: Vec<UrlEntry>,
    pub skipped_invalid: usize,
    pub skipped_duplicates: usize,
    pub unknown_hints: usize,
}

/// Parse `url [post|page]` lines. Blank lines and `#` comments are ignored,
/// duplicates keep their first occurrence.
pub fn parse_url_list(raw: &str) -> UrlListParse {
    let mut parsed = UrlListParse::default();
    let mut seen = HashSet::new();

    for line in raw.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(candidate) = parts.next() else {
            continue;
        };
        let Some(url) = parse_http_url(candidate) else {
            parsed.skipped_invalid += 1;
            continue;
        };

        let type_hint = match parts.next() {
            Some(hint) => match hint.parse::<ContentType>() {
                Ok(hint) => Some(hint),
                Err(_) => {
                    parsed.unknown_hints += 1;
                    None
                }
            },
            None => None,
        };

        if !seen.insert(dedupe_key(&url)) {
            parsed.skipped_duplicates += 1;
            continue;
        }

        parsed.entries.push(UrlEntry {
            url: candidate.to_string(),
            type_hint,
        });
    }

    parsed
}

/// Canonical form used to detect duplicate URLs: scheme and host lower-cased,
/// fragment dropped, trailing slash dropped.
pub fn normalize_url_for_dedupe(raw: &str) -> Option<String> {
    parse_http_url(raw).map(|url| dedupe_key(&url))
}

fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

fn dedupe_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    let trimmed_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed_path);
    url.as_str().trim_end_matches('/').to_string()
}
