//! Data quality rollup.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | totalRows | Raw rows across the three files |
//! | cleanRows | Rows admitted by the structural validator |
//! | errorRows | totalRows - cleanRows |
//! | qualityScore | round(100 * cleanRows / totalRows), 0 when empty |
//!
//! The score only reaches 0 when nothing was admitted and only reaches 100
//! when nothing was dropped: rounding is clamped into 1..=99 otherwise.

use serde::{Deserialize, Serialize};

/// Row-level quality summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub total_rows: usize,
    pub clean_rows: usize,
    pub error_rows: usize,
    /// Percentage 0-100.
    pub quality_score: u8,
}

impl DataQuality {
    /// Computes the rollup from raw and admitted row counts.
    ///
    /// `valid_rows` above `total_rows` is treated as `total_rows`.
    pub fn calculate(total_rows: usize, valid_rows: usize) -> Self {
        let clean_rows = valid_rows.min(total_rows);
        let error_rows = total_rows - clean_rows;

        let quality_score = if total_rows == 0 || clean_rows == 0 {
            0
        } else if error_rows == 0 {
            100
        } else {
            let pct = (100.0 * clean_rows as f64 / total_rows as f64).round() as u8;
            pct.clamp(1, 99)
        };

        Self {
            total_rows,
            clean_rows,
            error_rows,
            quality_score,
        }
    }

    /// Whether the score reaches the given threshold.
    pub fn meets_threshold(&self, min_score: u8) -> bool {
        self.quality_score >= min_score
    }
}
