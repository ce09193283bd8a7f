//! Pull structured content out of free-form model output.

/// Body of the first fenced block tagged `lang`, or of the first untagged
/// fence when `lang` is `None`.
fn fenced_block<'a>(text: &'a str, lang: Option<&str>) -> Option<&'a str> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_tick = &rest[start + 3..];
        let line_end = after_tick.find('\n')?;
        let tag = after_tick[..line_end].trim();
        let body = &after_tick[line_end + 1..];
        let end = body.find("```")?;

        let matches = match lang {
            Some(l) => tag.eq_ignore_ascii_case(l),
            None => true,
        };
        if matches {
            return Some(body[..end].trim());
        }
        rest = &body[end + 3..];
    }
    None
}

/// Extract JSON from an LLM response, handling markdown code blocks.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(block) = fenced_block(trimmed, Some("json")).or_else(|| fenced_block(trimmed, None)) {
        return block;
    }

    // Raw object, possibly surrounded by prose
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}

/// Extract a SQL statement from an LLM response.
///
/// Accepts a ```sql fence, any other fence, or bare SQL optionally
/// prefixed with `SQL:`. A trailing semicolon is removed.
pub fn extract_sql(response: &str) -> String {
    let trimmed = response.trim();

    let sql = fenced_block(trimmed, Some("sql"))
        .or_else(|| fenced_block(trimmed, None))
        .unwrap_or_else(|| {
            let lower = trimmed.to_lowercase();
            if lower.starts_with("sql:") {
                trimmed[4..].trim()
            } else {
                trimmed
            }
        });

    sql.trim().trim_end_matches(';').trim_end().to_string()
}
