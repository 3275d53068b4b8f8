// SPDX-License-Identifier: MIT OR Apache-2.0

//! Display excerpts pulled from markdown-like report text.

/// Section whose body is used as the excerpt when present.
pub const DEFAULT_SECTION: &str = "Incident Summary";
pub const DEFAULT_FALLBACK_LINES: usize = 4;
pub const DEFAULT_MAX_CHARS: usize = 1200;
pub const ELLIPSIS: &str = "...";

/// Options for [`extract_summary`].
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    /// Heading title to look for (compared case-insensitively)
    pub section: String,
    /// Number of leading lines used when the section is missing
    pub fallback_lines: usize,
    /// Maximum excerpt length in characters, before the ellipsis
    pub max_chars: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            section: DEFAULT_SECTION.to_string(),
            fallback_lines: DEFAULT_FALLBACK_LINES,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Extracts a bounded excerpt from `document`.
///
/// Uses the body of the configured section when the document has one,
/// otherwise its first lines.
pub fn extract_summary(document: &str, options: &SummaryOptions) -> String {
    let body = find_section(document, &options.section)
        .unwrap_or_else(|| first_lines(document, options.fallback_lines));
    truncate_with_ellipsis(&body, options.max_chars)
}

/// Returns the trimmed body under the heading titled `title`, ending at the
/// next heading of the same or a higher level.
pub fn find_section(document: &str, title: &str) -> Option<String> {
    let wanted = title.trim();
    let lines: Vec<&str> = document.lines().collect();

    let (start, level) = lines.iter().enumerate().find_map(|(idx, line)| {
        let (level, heading) = parse_heading(line)?;
        heading.eq_ignore_ascii_case(wanted).then_some((idx, level))
    })?;

    let body_lines = &lines[start + 1..];
    let end = body_lines
        .iter()
        .position(|line| matches!(parse_heading(line), Some((l, _)) if l <= level))
        .unwrap_or(body_lines.len());

    Some(body_lines[..end].join("\n").trim().to_string())
}

/// Parses an ATX heading (`#` to `######` followed by a space).
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim_end()))
}

fn first_lines(document: &str, count: usize) -> String {
    document
        .lines()
        .take(count)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Cuts `text` to `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", text[..idx].trim_end(), ELLIPSIS),
        None => text.to_string(),
    }
}
