//! Explicit-schema readers for the billing and roster sheets.
//!
//! Billing sheet: `physician`, optional `tier`, then one column per configured
//! category, each exactly once. Unrecognised or missing category columns are
//! rejected; an empty cell bills 0.

use crate::domain::model::{BillingTable, CategoryTable, Physician};
use crate::utils::error::{Result, SplitError};
use std::collections::HashSet;

pub const PHYSICIAN_COLUMN: &str = "physician";
pub const TIER_COLUMN: &str = "tier";

#[derive(Debug, Clone, PartialEq)]
pub struct BillingSheet {
    /// Present when the sheet carries a `tier` column.
    pub roster: Option<Vec<Physician>>,
    pub billing: BillingTable,
}

fn reader(data: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data)
}

/// Malformed rows are input errors naming the sheet row (header is row 1).
fn row_error(line: usize, error: csv::Error) -> SplitError {
    match error.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => SplitError::InvalidInput {
            location: format!("row {}", line + 2),
            reason: format!("expected {} cells, found {}", expected_len, len),
        },
        csv::ErrorKind::Utf8 { .. } => SplitError::InvalidInput {
            location: format!("row {}", line + 2),
            reason: "row is not valid UTF-8".to_string(),
        },
        _ => SplitError::CsvError(error),
    }
}

fn is_column(header: Option<&str>, expected: &str) -> bool {
    header.is_some_and(|h| h.eq_ignore_ascii_case(expected))
}

pub fn read_billing_sheet(data: &[u8], categories: &CategoryTable) -> Result<BillingSheet> {
    let mut rdr = reader(data);
    let headers = rdr.headers()?.clone();

    if !is_column(headers.get(0), PHYSICIAN_COLUMN) {
        return Err(SplitError::invalid_column(
            headers.get(0).unwrap_or(""),
            format!("first column must be '{}'", PHYSICIAN_COLUMN),
        ));
    }
    let has_tier = is_column(headers.get(1), TIER_COLUMN);
    let first_category = if has_tier { 2 } else { 1 };

    // 欄位順序 -> 類別名稱
    let mut columns = Vec::with_capacity(headers.len() - first_category);
    let mut seen = HashSet::new();
    for header in headers.iter().skip(first_category) {
        if categories.index_of(header).is_none() {
            return Err(SplitError::invalid_column(header, "unrecognized column"));
        }
        if !seen.insert(header) {
            return Err(SplitError::invalid_column(header, "column appears more than once"));
        }
        columns.push(header.to_string());
    }
    for name in categories.names() {
        if !seen.contains(name) {
            return Err(SplitError::invalid_column(name, "missing category column"));
        }
    }

    let mut roster = Vec::new();
    let mut billing = BillingTable::new();
    let mut physicians = HashSet::new();

    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| row_error(line, e))?;
        let physician = record.get(0).unwrap_or("");
        if physician.is_empty() {
            return Err(SplitError::InvalidInput {
                location: format!("row {}", line + 2),
                reason: "physician name is empty".to_string(),
            });
        }
        if !physicians.insert(physician.to_string()) {
            return Err(SplitError::invalid_physician(
                physician,
                "physician appears more than once in the sheet",
            ));
        }
        if has_tier {
            roster.push(Physician::new(physician, record.get(1).unwrap_or("")));
        }

        for (offset, category) in columns.iter().enumerate() {
            let cell = record.get(first_category + offset).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            let amount: f64 = cell.parse().map_err(|_| {
                SplitError::invalid_entry(physician, category, format!("unparseable amount '{}'", cell))
            })?;
            billing.insert(physician, category.as_str(), amount);
        }
    }

    tracing::debug!(
        "Read billing sheet: {} entries, tier column: {}",
        billing.len(),
        has_tier
    );

    Ok(BillingSheet {
        roster: has_tier.then_some(roster),
        billing,
    })
}

pub fn read_roster_sheet(data: &[u8]) -> Result<Vec<Physician>> {
    let mut rdr = reader(data);
    let headers = rdr.headers()?.clone();

    if headers.len() != 2
        || !is_column(headers.get(0), PHYSICIAN_COLUMN)
        || !is_column(headers.get(1), TIER_COLUMN)
    {
        return Err(SplitError::invalid_column(
            &headers.iter().collect::<Vec<_>>().join(","),
            "roster header must be 'physician,tier'",
        ));
    }

    let mut roster = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| row_error(line, e))?;
        roster.push(Physician::new(
            record.get(0).unwrap_or(""),
            record.get(1).unwrap_or(""),
        ));
    }
    Ok(roster)
}
