use url::Url;

/// Extensions treated as "this is a page" and normalized to `.html`.
pub const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp", "shtml"];

const SEGMENT_SEPARATOR: char = '_';
const INDEX_SEGMENT: &str = "index";

/// Filesystem-safe identifier: `{host}_{seg1}_{seg2}....html`.
///
/// Query strings and fragments do not contribute. Underscores inside a path
/// segment become hyphens so the separator stays unambiguous.
pub fn source_id_for_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = match url.port() {
        Some(port) => format!("{host}-{port}"),
        None => host,
    };

    let mut segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(sanitize_segment)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if let Some(last) = segments.last_mut() {
        *last = strip_page_extension(last).to_string();
        if last.is_empty() {
            segments.pop();
        }
    }
    if segments.is_empty() {
        segments.push(INDEX_SEGMENT.to_string());
    }

    let mut id = sanitize_segment(&host);
    for segment in segments {
        id.push(SEGMENT_SEPARATOR);
        id.push_str(&segment);
    }
    id.push_str(".html");
    Some(id)
}

/// Split a source id into its host part and path segments, with the page
/// extension removed from the final segment.
pub fn split_source_id(source_id: &str) -> (&str, Vec<&str>) {
    let trimmed = strip_page_extension(source_id);
    let mut parts = trimmed.split(SEGMENT_SEPARATOR);
    let host = parts.next().unwrap_or_default();
    let segments = parts.filter(|s| !s.is_empty()).collect();
    (host, segments)
}

pub(crate) fn strip_page_extension(name: &str) -> &str {
    if let Some((stem, ext)) = name.rsplit_once('.') {
        if PAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            return stem;
        }
    }
    name
}

pub(crate) fn is_index_segment(segment: &str) -> bool {
    segment.eq_ignore_ascii_case(INDEX_SEGMENT)
}

fn sanitize_segment(segment: &str) -> String {
    let decoded = percent_decode(segment);
    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_dash = false;
    for c in decoded.chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            c
        } else {
            '-'
        };
        if mapped == '-' {
            if !prev_dash {
                cleaned.push('-');
            }
            prev_dash = true;
        } else {
            cleaned.push(mapped);
            prev_dash = false;
        }
    }
    cleaned.trim_matches(&['-', '.'][..]).to_string()
}

/// Malformed escapes pass through unchanged; invalid UTF-8 becomes U+FFFD.
pub(crate) fn percent_decode(input: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_path_become_identifier() {
        let id = source_id_for_url("https://www.example.com/blog/2025/march/03/best-trucks.html");
        assert_eq!(
            id.as_deref(),
            Some("www.example.com_blog_2025_march_03_best-trucks.html")
        );
    }

    #[test]
    fn extensions_are_normalized() {
        assert_eq!(
            source_id_for_url("https://example.com/about-us.php").as_deref(),
            Some("example.com_about-us.html")
        );
        assert_eq!(
            source_id_for_url("https://example.com/about-us/").as_deref(),
            Some("example.com_about-us.html")
        );
    }

    #[test]
    fn root_becomes_index() {
        assert_eq!(
            source_id_for_url("https://Example.com/?utm=1#top").as_deref(),
            Some("example.com_index.html")
        );
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(
            source_id_for_url("https://example.com/my_post/a%20b:c").as_deref(),
            Some("example.com_my-post_a-b-c.html")
        );
    }

    #[test]
    fn escapes_decode_up_to_the_last_byte() {
        assert_eq!(percent_decode("caf%C3%A9%21"), "café!");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(
            source_id_for_url("https://example.com/towing%21").as_deref(),
            Some("example.com_towing.html")
        );
    }

    #[test]
    fn split_recovers_segments() {
        let (host, segments) = split_source_id("www.example.com_blog_best-trucks.html");
        assert_eq!(host, "www.example.com");
        assert_eq!(segments, vec!["blog", "best-trucks"]);
    }
}
