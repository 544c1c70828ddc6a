//! Inline `style` attribute editing.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub property: String,
    pub value: String,
}

pub(crate) fn parse(style: &str) -> Vec<Declaration> {
    split_declarations(style)
        .into_iter()
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                None
            } else {
                Some(Declaration {
                    property,
                    value: value.to_string(),
                })
            }
        })
        .collect()
}

/// Split on `;` outside quotes and parentheses, so `url("data:...;base64,...")`
/// and quoted font names stay whole.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&style[start..]);
    parts
}

pub(crate) fn render(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|d| format!("{}: {}", d.property, d.value))
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn has_property_prefix(declarations: &[Declaration], prefix: &str) -> bool {
    declarations.iter().any(|d| d.property.starts_with(prefix))
}

pub(crate) fn value_of<'a>(declarations: &'a [Declaration], property: &str) -> Option<&'a str> {
    declarations
        .iter()
        .rev()
        .find(|d| d.property == property)
        .map(|d| d.value.as_str())
}

/// Numeric part of a CSS length (`-.25in` -> -0.25). Units are ignored.
pub(crate) fn length_value(value: &str) -> Option<f64> {
    let value = value.trim().trim_end_matches("!important").trim();
    let end = value
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

/// Remove top/bottom margins. A `margin` shorthand keeps its horizontal part
/// as `margin-right`/`margin-left`.
pub(crate) fn strip_vertical_margins(declarations: Vec<Declaration>) -> Vec<Declaration> {
    let mut out = Vec::with_capacity(declarations.len());
    for decl in declarations {
        match decl.property.as_str() {
            "margin-top" | "margin-bottom" | "margin-block" | "margin-block-start"
            | "margin-block-end" => {}
            "margin" => {
                let parts: Vec<&str> = decl.value.split_whitespace().collect();
                let (right, left) = match parts.as_slice() {
                    [all] => (*all, *all),
                    [_, horizontal] | [_, horizontal, _] => (*horizontal, *horizontal),
                    [_, right, _, left] => (*right, *left),
                    _ => continue,
                };
                out.push(Declaration {
                    property: "margin-right".to_string(),
                    value: right.to_string(),
                });
                out.push(Declaration {
                    property: "margin-left".to_string(),
                    value: left.to_string(),
                });
            }
            _ => out.push(decl),
        }
    }
    out
}
