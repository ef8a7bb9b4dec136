//! Loading and saving project data.
//!
//! A project keeps its rows in one JSON document (every merged row
//! with its per-profile translations) and a small metadata document
//! alongside it. Profiles themselves are not persisted; they are
//! rebuilt from the rows' `translations` maps on load.

use std::{
    collections::BTreeSet,
    io::{Read, Write},
};

use anyhow::Context as _;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    profiles::{ProfileStore, ORIGINAL_PROFILE},
    rows::{RowStore, TextRow},
    Result,
};

/// Project metadata saved next to the row list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// The language of the untranslated pages.
    #[serde(default = "default_language")]
    pub original_language: String,
    /// The profile that was active when the project was saved.
    #[serde(default = "default_profile")]
    pub active_profile_name: String,
}

fn default_language() -> String {
    "Korean".to_owned()
}

fn default_profile() -> String {
    ORIGINAL_PROFILE.to_owned()
}

impl Default for ProjectMeta {
    fn default() -> ProjectMeta {
        ProjectMeta {
            original_language: default_language(),
            active_profile_name: default_profile(),
        }
    }
}

impl ProjectMeta {
    /// The profile to activate after loading: the saved one if it
    /// still exists, otherwise "Original".
    pub fn resolve_active_profile(&self, profiles: &ProfileStore) -> String {
        if profiles
            .profile_names()
            .contains(&self.active_profile_name.as_str())
        {
            self.active_profile_name.clone()
        } else {
            warn!(
                "saved active profile {:?} not found, defaulting to {:?}",
                self.active_profile_name, ORIGINAL_PROFILE
            );
            ORIGINAL_PROFILE.to_owned()
        }
    }
}

/// The result of loading a row list.
#[derive(Debug)]
pub struct LoadedRows {
    /// The rows that passed validation.
    pub rows: Vec<TextRow>,
    /// Every profile name seen in the rows' translations, plus
    /// "Original".
    pub profile_names: BTreeSet<String>,
}

/// Load a row list from JSON, keeping only records that carry the
/// required fields. Saved projects accumulate cruft over time (older
/// versions wrote partial records), so incomplete entries are dropped
/// with a warning rather than failing the load.
pub fn load_rows<R: Read>(reader: R) -> Result<LoadedRows> {
    let records: Vec<Value> =
        serde_json::from_reader(reader).context("could not parse project rows")?;

    let mut rows = vec![];
    let mut profile_names = BTreeSet::new();
    profile_names.insert(ORIGINAL_PROFILE.to_owned());

    for record in records {
        let complete = ["filename", "row_number", "coordinates", "text"]
            .iter()
            .all(|k| record.get(k).is_some());
        if !complete {
            warn!("dropping incomplete row record: {}", record);
            continue;
        }
        match serde_json::from_value::<TextRow>(record) {
            Ok(row) => {
                profile_names.extend(row.translations.keys().cloned());
                rows.push(row);
            }
            Err(err) => warn!("dropping malformed row record: {}", err),
        }
    }

    debug!(
        "loaded {} rows, profiles {:?}",
        rows.len(),
        profile_names
    );
    Ok(LoadedRows {
        rows,
        profile_names,
    })
}

/// Save the row store as pretty-printed JSON, sorted by filename and
/// row number.
pub fn save_rows<W: Write>(writer: W, store: &mut RowStore) -> Result<()> {
    store.sort_rows();
    serde_json::to_writer_pretty(writer, store.rows())
        .context("could not write project rows")?;
    Ok(())
}

/// Write the profile store's current state back onto the rows'
/// `translations` maps, so that saving the rows persists every
/// profile.
pub fn apply_profiles_to_rows(store: &mut RowStore, profiles: &ProfileStore) {
    let saved = profiles.get_translations_for_save();
    // Rebuild each row's map wholesale; profiles are the source of
    // truth for everything except "Original".
    for row in store.rows_mut() {
        let key = (row.filename.clone(), row.key());
        row.translations = saved.get(&key).cloned().unwrap_or_default();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{geom::Point, profiles::ProfileStore};
    use std::collections::BTreeMap;

    fn row(filename: &str, row_number: f64, text: &str) -> TextRow {
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
    fn rows_round_trip_through_json() {
        let mut original = row("p1.png", 1.0, "Hello");
        original
            .translations
            .insert("French".to_owned(), "Bonjour".to_owned());
        let mut store = RowStore::from_rows(vec![original, row("p1.png", 2.5, "Half")]);

        let mut buf = vec![];
        save_rows(&mut buf, &mut store).unwrap();
        let loaded = load_rows(buf.as_slice()).unwrap();

        assert_eq!(loaded.rows, store.rows());
        assert!(loaded.profile_names.contains("Original"));
        assert!(loaded.profile_names.contains("French"));
    }

    #[test]
    fn incomplete_records_are_dropped() {
        let json = r#"[
            {"filename": "p1.png", "row_number": 1,
             "coordinates": [[0,0],[1,0],[1,1],[0,1]], "text": "ok"},
            {"filename": "p1.png", "text": "no row number"},
            {"row_number": 2, "text": "no filename"}
        ]"#;
        let loaded = load_rows(json.as_bytes()).unwrap();
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.rows[0].text, "ok");
    }

    #[test]
    fn meta_defaults_and_fallback() {
        let meta: ProjectMeta = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.original_language, "Korean");
        assert_eq!(meta.active_profile_name, "Original");

        let meta = ProjectMeta {
            original_language: "Japanese".to_owned(),
            active_profile_name: "Gone".to_owned(),
        };
        let profiles = ProfileStore::new();
        assert_eq!(meta.resolve_active_profile(&profiles), "Original");
    }

    #[test]
    fn profiles_are_applied_to_rows_before_save() {
        let mut store = RowStore::from_rows(vec![row("p1.png", 0.0, "Hello")]);
        let mut profiles = ProfileStore::new();
        profiles.load_from_results(store.rows());
        let rows_snapshot = store.clone();
        profiles.update_text(&rows_snapshot, 0.0, "Hi");

        apply_profiles_to_rows(&mut store, &profiles);
        assert_eq!(store.rows()[0].translations["User Edit 1"], "Hi");
    }
}
