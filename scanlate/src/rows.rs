//! Merged text rows and the store that owns them.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::geom::Point;

/// The canonical string form of a row number, used as the key in
/// profile and translation maps.
///
/// Row numbers are floats internally (fractional numbers preserve
/// ordering when rows are synthesized between existing ones), but
/// every map lookup goes through this form so that `3.0` and `"3"`
/// can't silently refer to different entries.
pub fn row_key(row_number: f64) -> String {
    if row_number.is_finite() && row_number.fract() == 0.0 {
        format!("{}", row_number as i64)
    } else {
        format!("{}", row_number)
    }
}

/// Normalize an externally-supplied row key (for example, one parsed
/// from an exchange document) to the canonical form. Non-numeric
/// strings are passed through unchanged.
pub fn normalize_row_key(key: &str) -> String {
    match key.trim().parse::<f64>() {
        Ok(n) => row_key(n),
        Err(_) => key.trim().to_owned(),
    }
}

/// Do two row numbers refer to the same row? Row numbers pass through
/// string form in saved projects, so we compare with a tolerance
/// rather than exactly.
pub fn same_row_number(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// One merged, user-addressable text block within an image. This is
/// the durable unit: rows survive in the project file and are the keys
/// that profiles and exchange documents address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextRow {
    /// Base name of the owning image (a key, not a path).
    pub filename: String,
    /// Row identifier, unique within `filename`. Usually an integer;
    /// fractional when a row was synthesized by splitting or
    /// combining.
    pub row_number: f64,
    /// Merged bounding polygon, as four corner points.
    pub coordinates: [Point; 4],
    /// The "Original" profile's text for this row (the OCR output).
    pub text: String,
    /// Mean detector confidence of the merged fragments.
    #[serde(default)]
    pub confidence: f32,
    /// Total number of text lines across the merged fragments.
    #[serde(default)]
    pub line_counts: u32,
    /// Soft-delete flag. Deleted rows are excluded from display and
    /// export but stay addressable until `purge_deleted`.
    #[serde(default)]
    pub is_deleted: bool,
    /// True if this row came from a user-selected region rather than
    /// full-page OCR.
    #[serde(default)]
    pub is_manual: bool,
    /// Per-profile text variants, keyed by profile name. "Original" is
    /// never stored here; it lives in `text`.
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    /// Opaque per-row rendering override, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_style: Option<serde_json::Value>,
}

impl TextRow {
    /// The canonical key form of this row's number.
    pub fn key(&self) -> String {
        row_key(self.row_number)
    }
}

/// Owns the canonical list of text rows for a project and hands out
/// row numbers.
#[derive(Clone, Debug, Default)]
pub struct RowStore {
    rows: Vec<TextRow>,
}

impl RowStore {
    /// Create an empty store.
    pub fn new() -> RowStore {
        RowStore::default()
    }

    /// Create a store from already-numbered rows (for example, rows
    /// loaded from a project file).
    pub fn from_rows(rows: Vec<TextRow>) -> RowStore {
        let mut store = RowStore { rows };
        store.sort_rows();
        store
    }

    /// All rows, including soft-deleted ones.
    pub fn rows(&self) -> &[TextRow] {
        &self.rows
    }

    /// Mutable access for internal callers that rewrite row fields
    /// without touching identity.
    pub(crate) fn rows_mut(&mut self) -> &mut [TextRow] {
        &mut self.rows
    }

    /// All rows that haven't been soft-deleted.
    pub fn visible_rows(&self) -> impl Iterator<Item = &TextRow> {
        self.rows.iter().filter(|r| !r.is_deleted)
    }

    /// The next free integer row number. Row numbers count up from the
    /// largest number ever assigned (fractional rows count via their
    /// integer part), so new rows never collide with existing ones in
    /// any file.
    pub fn next_row_base(&self) -> i64 {
        self.rows
            .iter()
            .map(|r| r.row_number.floor() as i64)
            .max()
            .map_or(0, |n| n + 1)
    }

    /// Add newly merged rows to the store and re-sort. The rows must
    /// already carry row numbers (the grouping engine assigns them
    /// from `next_row_base`).
    pub fn add_rows(&mut self, new_rows: Vec<TextRow>) {
        self.rows.extend(new_rows);
        self.sort_rows();
    }

    /// Find a row by its number, tolerating the float/string
    /// round-trips row numbers go through.
    pub fn find_by_row_number(&self, row_number: f64) -> Option<&TextRow> {
        self.rows
            .iter()
            .find(|r| same_row_number(r.row_number, row_number))
    }

    /// Mutable variant of `find_by_row_number`.
    pub fn find_by_row_number_mut(&mut self, row_number: f64) -> Option<&mut TextRow> {
        self.rows
            .iter_mut()
            .find(|r| same_row_number(r.row_number, row_number))
    }

    /// Soft-delete a row. Referencing an unknown or already-deleted
    /// row is a logged no-op, because deletions can race with stale UI
    /// actions.
    pub fn delete_row(&mut self, row_number: f64) -> bool {
        match self.find_by_row_number_mut(row_number) {
            Some(row) if !row.is_deleted => {
                row.is_deleted = true;
                true
            }
            Some(_) => {
                warn!("row {} is already deleted", row_key(row_number));
                false
            }
            None => {
                warn!("no row {} to delete", row_key(row_number));
                false
            }
        }
    }

    /// Remove all non-manual rows, keeping user-selected ones. Called
    /// before re-running full-page OCR.
    pub fn clear_standard_rows(&mut self) {
        self.rows.retain(|r| r.is_manual);
    }

    /// Physically remove soft-deleted rows. This is the only way a row
    /// ever leaves the store other than `clear_standard_rows`.
    pub fn purge_deleted(&mut self) {
        self.rows.retain(|r| !r.is_deleted);
    }

    /// Sort rows by filename, then row number.
    pub fn sort_rows(&mut self) {
        self.rows.sort_by(|a, b| {
            (a.filename.as_str(), a.row_number)
                .partial_cmp(&(b.filename.as_str(), b.row_number))
                .expect("row numbers should never be NaN")
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub fn row(filename: &str, row_number: f64, text: &str) -> TextRow {
        TextRow {
            filename: filename.to_owned(),
            row_number,
            coordinates: [
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
            ],
            text: text.to_owned(),
            confidence: 0.9,
            line_counts: 1,
            is_deleted: false,
            is_manual: false,
            translations: BTreeMap::new(),
            custom_style: None,
        }
    }

    #[test]
    fn row_keys_are_canonical() {
        assert_eq!(row_key(3.0), "3");
        assert_eq!(row_key(3.5), "3.5");
        assert_eq!(row_key(0.0), "0");
        assert_eq!(normalize_row_key("3.0"), "3");
        assert_eq!(normalize_row_key("3.5"), "3.5");
        assert_eq!(normalize_row_key(" 7 "), "7");
        assert_eq!(normalize_row_key("not-a-number"), "not-a-number");
    }

    #[test]
    fn next_row_base_skips_existing_rows() {
        let mut store = RowStore::new();
        assert_eq!(store.next_row_base(), 0);
        store.add_rows(vec![row("p1.png", 0.0, "a"), row("p1.png", 3.5, "b")]);
        assert_eq!(store.next_row_base(), 4);
        store.add_rows(vec![row("p2.png", 4.0, "c")]);
        assert_eq!(store.next_row_base(), 5);
    }

    #[test]
    fn soft_delete_and_purge() {
        let mut store =
            RowStore::from_rows(vec![row("p1.png", 0.0, "a"), row("p1.png", 1.0, "b")]);
        assert!(store.delete_row(1.0));
        assert!(!store.delete_row(1.0));
        assert!(!store.delete_row(99.0));
        assert_eq!(store.visible_rows().count(), 1);
        assert_eq!(store.rows().len(), 2);

        store.purge_deleted();
        assert_eq!(store.rows().len(), 1);
        assert_eq!(store.rows()[0].text, "a");
    }

    #[test]
    fn clear_standard_rows_keeps_manual_ones() {
        let mut manual = row("p1.png", 1.0, "manual");
        manual.is_manual = true;
        let mut store = RowStore::from_rows(vec![row("p1.png", 0.0, "auto"), manual]);
        store.clear_standard_rows();
        assert_eq!(store.rows().len(), 1);
        assert!(store.rows()[0].is_manual);
        assert_eq!(store.next_row_base(), 2);
    }

    #[test]
    fn find_tolerates_float_round_trips() {
        let store = RowStore::from_rows(vec![row("p1.png", 3.0, "a")]);
        let reparsed: f64 = "3".parse().unwrap();
        assert!(store.find_by_row_number(reparsed).is_some());
        assert!(store.find_by_row_number(3.5).is_none());
    }

    #[test]
    fn rows_sort_by_filename_then_number() {
        let mut store = RowStore::new();
        store.add_rows(vec![
            row("b.png", 2.0, "w"),
            row("a.png", 3.0, "x"),
            row("b.png", 1.5, "y"),
            row("a.png", 0.0, "z"),
        ]);
        let order: Vec<_> = store
            .rows()
            .iter()
            .map(|r| (r.filename.as_str(), r.row_number))
            .collect();
        assert_eq!(
            order,
            vec![("a.png", 0.0), ("a.png", 3.0), ("b.png", 1.5), ("b.png", 2.0)]
        );
    }
}
