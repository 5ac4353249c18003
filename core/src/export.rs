//! CSV export of list views.
//!
//! Every field is double-quoted and embedded quotes are doubled, so values
//! containing commas, quotes or newlines survive a standard CSV reader. The
//! host turns the text into a file download named by `export_filename`.

use chrono::NaiveDate;

use crate::resource::{Record, ResourceKind};

/// One exported column: header text and the record field it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub header: String,
    pub field: String,
}

impl Column {
    pub fn new(header: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: field.into(),
        }
    }
}

/// Header row plus one row per record. Missing fields export as `""`.
pub fn to_csv<'a, R, I>(items: I, columns: &[Column]) -> String
where
    R: Record + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut out = row(columns.iter().map(|column| column.header.clone()));
    for item in items {
        out.push_str(&row(
            columns
                .iter()
                .map(|column| item.text(&column.field).unwrap_or_default()),
        ));
    }
    out
}

fn row(fields: impl Iterator<Item = String>) -> String {
    let mut line = fields.map(|field| quote(&field)).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// `<resource>-<YYYY-MM-DD>.csv`
pub fn export_filename(kind: ResourceKind, date: NaiveDate) -> String {
    format!("{}-{}.csv", kind.collection(), date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quotes_every_field_and_doubles_quotes() {
        let items = vec![json!({"name": "Obi, Ada", "note": "said \"amen\""})];
        let csv = to_csv(&items, &[Column::new("Name", "name"), Column::new("Note", "note")]);
        assert_eq!(csv, "\"Name\",\"Note\"\n\"Obi, Ada\",\"said \"\"amen\"\"\"\n");
    }

    #[test]
    fn missing_fields_are_empty() {
        let items = vec![json!({"name": "Ada"})];
        let csv = to_csv(&items, &[Column::new("Name", "name"), Column::new("Phone", "phone")]);
        assert_eq!(csv.lines().nth(1), Some("\"Ada\",\"\""));
    }

    #[test]
    fn filename_pattern() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(export_filename(ResourceKind::Donation, date), "donations-2026-10-19.csv");
        assert_eq!(export_filename(ResourceKind::FirstTimer, date), "first-timers-2026-10-19.csv");
    }
}
