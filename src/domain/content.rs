//! Pure helpers over raw article bodies.
//!
//! Article content is stored as authored HTML. Reading time and summaries
//! work on the visible text, so markup is stripped first.

const WORDS_PER_MINUTE: usize = 225;
const SUMMARY_MAX_CHARS: usize = 160;

/// Remove markup tags from a fragment, keeping the visible text.
///
/// This is a display helper, not a sanitizer; it never has to be
/// security-precise because the output is only word-counted or truncated.
pub fn strip_tags(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut in_tag = false;

    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Keep words on either side of a tag separated.
                if !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    text
}

pub fn word_count(input: &str) -> usize {
    strip_tags(input).split_whitespace().count()
}

/// Estimated reading time in whole minutes, never below one.
pub fn reading_time_minutes(input: &str) -> usize {
    let words = word_count(input);
    let minutes = (words as f64 / WORDS_PER_MINUTE as f64).round() as usize;
    minutes.max(1)
}

/// A short plain-text summary cut at a word boundary, suffixed with an
/// ellipsis when the content was truncated.
pub fn summarize(input: &str) -> String {
    let text = strip_tags(input);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= SUMMARY_MAX_CHARS {
        return collapsed;
    }

    let prefix: String = collapsed.chars().take(SUMMARY_MAX_CHARS).collect();
    let cut = prefix.rfind(' ').unwrap_or(prefix.len());
    format!("{}...", prefix[..cut].trim_end())
}

/// The `src` of the first `<img>` in the fragment, if any.
pub fn first_image_url(input: &str) -> Option<String> {
    let lower = input.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(offset) = lower[search_from..].find("<img") {
        let tag_start = search_from + offset;
        let tag_end = lower[tag_start..].find('>').map(|end| tag_start + end)?;
        let tag = &input[tag_start..tag_end];

        if let Some(src) = attribute_value(tag, "src") {
            return Some(src);
        }
        search_from = tag_end + 1;
    }

    None
}

fn attribute_value(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{name}=");
    let start = lower.find(&needle)? + needle.len();
    let rest = &tag[start..];

    let mut chars = rest.chars();
    let first = chars.next()?;
    let value = if first == '"' || first == '\'' {
        rest[1..].split(first).next()?
    } else {
        rest.split(|c: char| c.is_whitespace() || c == '>').next()?
    };

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
