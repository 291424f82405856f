//! Month label value type
//!
//! Snapshots are keyed by human-readable labels such as "April 2025".
//! `MonthKey` is the parsed, sortable form of such a label.

use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed `(year, month)` key, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    /// Calendar year (4 digits)
    pub year: i32,
    /// Month number, 1 = January
    pub month: u32,
}

impl MonthKey {
    /// Build a key, rejecting out-of-range months
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    /// Parse "⟨MonthName⟩ ⟨Year⟩"
    ///
    /// Month names are English, full or three-letter, case-insensitive.
    /// Anything else (extra tokens, unknown names, non 4-digit years)
    /// yields `None`.
    pub fn parse(label: &str) -> Option<Self> {
        let mut parts = label.split_whitespace();
        let (name, year) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let month = name.parse::<Month>().ok()?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: i32 = year.parse().ok()?;

        Self::new(year, month.number_from_month())
    }

    /// First day of the month
    fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Calendar days in this month (leap-aware)
    pub fn days_in_month(&self) -> u32 {
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };

        match (self.first_day(), next) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            // Only reachable at the edge of chrono's supported range
            _ => 31,
        }
    }

    /// Canonical label, e.g. "April 2025"
    pub fn label(&self) -> String {
        match self.first_day() {
            Some(date) => format!("{} {}", date.format("%B"), date.year()),
            None => format!("{:02}/{}", self.month, self.year),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
