use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDate;
use chronicle_types::{DEFAULT_ICON, TimelineDocument, TimelineEntry};

use super::error::TimelineError;

/// Current local date, the value written to `lastUpdated`
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// URL-safe slug: lowercase ASCII words joined by single hyphens.
///
/// Characters other than letters, digits, `_`, `-` and whitespace are dropped
/// without leaving a separator, so "A.I." becomes "ai".
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.to_lowercase().chars() {
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }
    slug
}

/// Identifier for an entry that was submitted without one
pub fn entry_id(year: &str, title: &str) -> String {
    format!("{}-{}", slugify(year), slugify(title))
}

/// Fill the fields an editor may leave blank
pub fn prepare_entry(mut entry: TimelineEntry) -> TimelineEntry {
    if entry.id.trim().is_empty() {
        entry.id = entry_id(&entry.year, &entry.title);
    }
    if entry.icon.trim().is_empty() {
        entry.icon = DEFAULT_ICON.to_string();
    }
    entry
}

/// A new entry needs a year, a title and details
pub fn validate_new_entry(entry: &TimelineEntry) -> Result<(), TimelineError> {
    let mut missing = Vec::new();
    if entry.year.trim().is_empty() {
        missing.push("year");
    }
    if entry.title.trim().is_empty() {
        missing.push("title");
    }
    if entry.details.trim().is_empty() {
        missing.push("details");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TimelineError::validation(format!(
            "year, title, and details are required (missing: {})",
            missing.join(", ")
        )))
    }
}

/// Whole-document check applied before a save replaces the stored timeline
pub fn validate_document(document: &TimelineDocument) -> Result<(), TimelineError> {
    let mut seen = HashSet::with_capacity(document.timeline.len());
    for (index, entry) in document.timeline.iter().enumerate() {
        if entry.id.trim().is_empty() {
            return Err(TimelineError::validation(format!(
                "entry {} has an empty id",
                index
            )));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(TimelineError::validation(format!(
                "duplicate entry id '{}'",
                entry.id
            )));
        }
    }
    Ok(())
}

/// Display order: by the numeric part of the year. Years without digits go
/// last in plain string order. Equal keys keep their stored order.
pub fn sorted_entries(entries: &[TimelineEntry]) -> Vec<TimelineEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(compare_years);
    sorted
}

fn compare_years(a: &TimelineEntry, b: &TimelineEntry) -> Ordering {
    match (a.year_key(), b.year_key()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.year.cmp(&b.year),
    }
}
