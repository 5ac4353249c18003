//! CSV export read back with ordinary comma/quote rules.

use chrono::NaiveDate;
use church_core::view::{in_month, sum};
use church_core::{export_filename, to_csv, Column, Donation, Filter, ResourceKind};
use serde_json::{json, Value};

/// RFC 4180 reader: quoted fields may contain commas, doubled quotes and
/// newlines.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => in_quotes = false,
            ('"', false) => in_quotes = true,
            (',', false) => row.push(std::mem::take(&mut field)),
            ('\n', false) => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            (c, _) => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn donation_columns() -> Vec<Column> {
    vec![
        Column::new("Donor", "donorName"),
        Column::new("Email", "email"),
        Column::new("Amount", "amount"),
        Column::new("Reference", "reference"),
        Column::new("Note", "note"),
    ]
}

#[test]
fn donations_round_trip_through_csv() {
    let donations: Vec<Donation> = serde_json::from_value(json!([
        {"id": "d1", "donorName": "Okafor, Grace", "email": "grace@example.org",
         "amount": 5000, "reference": "TITHE-01", "note": "Said \"thank you\""},
        {"_id": "d2", "donorName": "Ben", "amount": "12.5", "reference": "line\nbreak"},
        {"id": 3, "donorName": "", "email": "anon@example.org"}
    ]))
    .unwrap();

    let csv = to_csv(&donations, &donation_columns());
    let rows = parse_csv(&csv);

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], vec!["Donor", "Email", "Amount", "Reference", "Note"]);
    assert_eq!(
        rows[1],
        vec!["Okafor, Grace", "grace@example.org", "5000", "TITHE-01", "Said \"thank you\""]
    );
    assert_eq!(rows[2], vec!["Ben", "", "12.5", "line\nbreak", ""]);
    assert_eq!(rows[3], vec!["", "anon@example.org", "", "", ""]);
}

#[test]
fn filtered_view_exports_only_visible_rows() {
    let prayers: Vec<Value> = vec![
        json!({"id": "p1", "name": "Ada", "request": "Healing, strength", "status": "Pending"}),
        json!({"id": "p2", "name": "Ben", "request": "Travel", "status": "answered"}),
        json!({"id": "p3", "name": "Adaeze", "request": "Exams", "status": "pending"}),
    ];
    let filter = Filter::new().status("pending").search("ada", ["name", "request"]);
    let visible = filter.apply(&prayers);

    let columns = [Column::new("Name", "name"), Column::new("Request", "request")];
    let rows = parse_csv(&to_csv(visible, &columns));

    assert_eq!(
        rows,
        vec![
            vec!["Name", "Request"],
            vec!["Ada", "Healing, strength"],
            vec!["Adaeze", "Exams"],
        ]
    );
}

#[test]
fn monthly_total_and_filename() {
    let donations: Vec<Donation> = serde_json::from_value(json!([
        {"id": "d1", "amount": 100, "date": "2026-10-02T09:30:00Z"},
        {"id": "d2", "amount": "250.5", "date": "2026-10-18"},
        {"id": "d3", "amount": 75, "date": "2026-09-30"},
        {"id": "d4", "amount": "n/a", "date": "2026-10-05"}
    ]))
    .unwrap();
    let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

    let this_month = in_month(&donations, "date", today);
    assert_eq!(this_month.len(), 3);
    assert_eq!(sum(this_month, "amount"), 350.5);
    assert_eq!(
        export_filename(ResourceKind::Donation, today),
        "donations-2026-10-19.csv"
    );
}
