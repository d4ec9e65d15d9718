//! Probing helpers for extracted financial document data.
//!
//! Parsed documents carry an untyped key/value tree. Statement periods are
//! keyed by 4-digit years; metric fields are located by name with a
//! recursive search through nested objects.

use crate::models::{Document, DocumentType, SessionContext};
use serde_json::Value;

/// Field-name aliases accepted for common statement metrics.
pub const REVENUE_KEYS: &[&str] = &["revenue", "total_revenue", "sales", "turnover"];
pub const NET_INCOME_KEYS: &[&str] = &["net_income", "net_profit", "profit", "net_earnings"];
pub const ASSETS_KEYS: &[&str] = &["assets", "total_assets"];
pub const LIABILITIES_KEYS: &[&str] = &["liabilities", "total_liabilities"];
pub const EQUITY_KEYS: &[&str] = &["equity", "shareholders_equity", "net_assets"];

/// Parse a key as a 4-digit year.
fn parse_year(key: &str) -> Option<i32> {
    if key.len() == 4 && key.chars().all(|c| c.is_ascii_digit()) {
        key.parse().ok()
    } else {
        None
    }
}

/// Find a numeric field by any of the given names, searching nested
/// objects recursively (depth-first, first match wins).
pub fn find_number(value: &Value, names: &[&str]) -> Option<f64> {
    let map = value.as_object()?;

    for name in names {
        if let Some(v) = map.get(*name).and_then(Value::as_f64) {
            return Some(v);
        }
    }

    for nested in map.values() {
        if nested.is_object() {
            if let Some(v) = find_number(nested, names) {
                return Some(v);
            }
        }
    }

    None
}

/// All year-keyed periods in a document's data, sorted ascending by year.
pub fn year_periods(doc: &Document) -> Vec<(i32, &Value)> {
    let mut periods: Vec<(i32, &Value)> = doc
        .data
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| parse_year(k).map(|y| (y, v)))
                .collect()
        })
        .unwrap_or_default();
    periods.sort_by_key(|(year, _)| *year);
    periods
}

/// The most recent year-keyed period in a document, if any.
#[allow(dead_code)] // Utility for callers probing a single document
pub fn latest_period(doc: &Document) -> Option<(i32, &Value)> {
    year_periods(doc).into_iter().next_back()
}

/// Every (year, value) pair for a metric across all documents of a type.
/// Years are deduplicated keeping the last-seen value, sorted ascending.
pub fn metric_by_year(
    ctx: &SessionContext,
    doc_type: DocumentType,
    names: &[&str],
) -> Vec<(i32, f64)> {
    let mut series: Vec<(i32, f64)> = Vec::new();

    for doc in ctx.documents_of_type(doc_type) {
        for (year, period) in year_periods(doc) {
            if let Some(v) = find_number(period, names) {
                if let Some(entry) = series.iter_mut().find(|(y, _)| *y == year) {
                    entry.1 = v;
                } else {
                    series.push((year, v));
                }
            }
        }
        // Documents without year keys may carry the metric at the top level.
        if year_periods(doc).is_empty() {
            if let Some(v) = find_number(&doc.data, names) {
                series.push((0, v));
            }
        }
    }

    series.sort_by_key(|(year, _)| *year);
    series
}

/// The latest-year value of a metric across all documents of a type.
pub fn latest_metric(ctx: &SessionContext, doc_type: DocumentType, names: &[&str]) -> Option<f64> {
    metric_by_year(ctx, doc_type, names)
        .last()
        .map(|(_, v)| *v)
}
