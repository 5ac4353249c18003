//! Derived view models: filters, aggregates and grouping.
//!
//! All functions are pure over a borrowed list and never mutate it.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate};

use crate::resource::Record;

/// Client-side list filter: optional status equality plus a
/// case-insensitive substring search over a set of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    status: Option<String>,
    status_field: String,
    search: Option<String>,
    search_fields: Vec<String>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            status: None,
            status_field: "status".to_string(),
            search: None,
            search_fields: Vec::new(),
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep records whose status equals `status`. `"all"` and blank disable
    /// the check.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        let status = status.into();
        let status = status.trim();
        self.status = (!status.is_empty() && !status.eq_ignore_ascii_case("all"))
            .then(|| status.to_ascii_lowercase());
        self
    }

    pub fn status_field(mut self, field: impl Into<String>) -> Self {
        self.status_field = field.into();
        self
    }

    pub fn search<I, S>(mut self, query: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let query = query.into().trim().to_lowercase();
        self.search = (!query.is_empty()).then_some(query);
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        if let Some(status) = &self.status {
            let actual = record.text(&self.status_field).unwrap_or_default();
            if actual.to_ascii_lowercase() != *status {
                return false;
            }
        }
        match &self.search {
            Some(query) => self.search_fields.iter().any(|field| {
                record
                    .text(field)
                    .is_some_and(|value| value.to_lowercase().contains(query.as_str()))
            }),
            None => true,
        }
    }

    pub fn apply<'a, R: Record>(&self, items: &'a [R]) -> Vec<&'a R> {
        items.iter().filter(|item| self.matches(*item)).collect()
    }
}

/// Sum a numeric field, skipping records where it is missing or malformed.
pub fn sum<'a, R, I>(items: I, field: &str) -> f64
where
    R: Record + 'a,
    I: IntoIterator<Item = &'a R>,
{
    items
        .into_iter()
        .filter_map(|item| item.number(field))
        .sum()
}

/// Count records per value of `field`. Records without it count under `""`.
pub fn count_by<R: Record>(items: &[R], field: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item.text(field).unwrap_or_default()).or_insert(0) += 1;
    }
    counts
}

/// Group records by the value of `field`, keeping list order within groups.
pub fn group_by<'a, R: Record>(items: &'a [R], field: &str) -> BTreeMap<String, Vec<&'a R>> {
    let mut groups: BTreeMap<String, Vec<&'a R>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.text(field).unwrap_or_default())
            .or_default()
            .push(item);
    }
    groups
}

/// Parse a date field written as RFC 3339 or as a `YYYY-MM-DD` prefix.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.date_naive());
    }
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Records whose date field falls in the same calendar month and year as
/// `reference`.
pub fn in_month<'a, R: Record>(items: &'a [R], field: &str, reference: NaiveDate) -> Vec<&'a R> {
    items
        .iter()
        .filter(|item| {
            item.text(field)
                .as_deref()
                .and_then(parse_date)
                .is_some_and(|date| date.year() == reference.year() && date.month() == reference.month())
        })
        .collect()
}
