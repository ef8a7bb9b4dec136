//! Named text profiles: "Original", user edits, and imported
//! translations.
//!
//! A profile is a complete variant of the text for every row in a
//! project. "Original" holds the OCR output and is never edited
//! directly; the first edit while it is active forks a deep copy into
//! a "User Edit N" profile and switches to that. Mutating operations
//! return explicit [`ProfileEvent`]s instead of firing callbacks, so
//! callers decide how to react.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::rows::{row_key, RowStore, TextRow};

/// The reserved baseline profile name.
pub const ORIGINAL_PROFILE: &str = "Original";

/// Text for every row of a profile: filename → row key → text.
pub type ProfileData = BTreeMap<String, BTreeMap<String, String>>;

/// A change made by a mutating `ProfileStore` operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileEvent {
    /// The set of profiles changed (one was added or rebuilt).
    ProfilesUpdated,
    /// The active profile switched to the named profile.
    ActiveProfileChanged(String),
    /// A "User Edit N" profile was forked from "Original".
    EditProfileCreated(String),
}

/// Owns all text profiles for a project and tracks which one is
/// active.
#[derive(Clone, Debug)]
pub struct ProfileStore {
    profiles: BTreeMap<String, ProfileData>,
    active: String,
}

impl Default for ProfileStore {
    fn default() -> ProfileStore {
        ProfileStore::new()
    }
}

impl ProfileStore {
    /// Create a store containing only an empty "Original" profile.
    pub fn new() -> ProfileStore {
        let mut profiles = BTreeMap::new();
        profiles.insert(ORIGINAL_PROFILE.to_owned(), ProfileData::new());
        ProfileStore {
            profiles,
            active: ORIGINAL_PROFILE.to_owned(),
        }
    }

    /// Reset all profile state and rebuild it from a row list:
    /// "Original" from each row's `text`, any other profiles from the
    /// rows' `translations` maps. Rows with an empty filename are
    /// skipped.
    pub fn load_from_results(&mut self, rows: &[TextRow]) -> Vec<ProfileEvent> {
        self.profiles.clear();
        self.profiles
            .insert(ORIGINAL_PROFILE.to_owned(), ProfileData::new());
        self.active = ORIGINAL_PROFILE.to_owned();

        for row in rows {
            if row.filename.is_empty() {
                debug!("skipping row {} with no filename", row.key());
                continue;
            }
            let key = row.key();
            self.profiles
                .get_mut(ORIGINAL_PROFILE)
                .expect("Original profile always exists")
                .entry(row.filename.clone())
                .or_default()
                .insert(key.clone(), row.text.clone());

            for (profile_name, text) in &row.translations {
                self.profiles
                    .entry(profile_name.clone())
                    .or_default()
                    .entry(row.filename.clone())
                    .or_default()
                    .insert(key.clone(), text.clone());
            }
        }
        debug!("loaded profiles: {:?}", self.profile_names());
        vec![ProfileEvent::ProfilesUpdated]
    }

    /// Add a new profile, typically from an imported translation. If
    /// the name is taken, " (1)", " (2)", ... is appended until it is
    /// unique. Does not change the active profile. Returns the final
    /// name along with the events.
    pub fn add_profile(
        &mut self,
        profile_name: &str,
        data: ProfileData,
    ) -> (String, Vec<ProfileEvent>) {
        let mut name = profile_name.to_owned();
        let mut counter = 1;
        while self.profiles.contains_key(&name) {
            name = format!("{} ({})", profile_name, counter);
            counter += 1;
        }
        debug!("added profile {:?}", name);
        self.profiles.insert(name.clone(), data);
        (name, vec![ProfileEvent::ProfilesUpdated])
    }

    /// Switch the active profile. A no-op if the name is unknown or
    /// already active.
    pub fn switch_active_profile(&mut self, profile_name: &str) -> Vec<ProfileEvent> {
        if profile_name == self.active || !self.profiles.contains_key(profile_name) {
            return vec![];
        }
        self.active = profile_name.to_owned();
        vec![ProfileEvent::ActiveProfileChanged(profile_name.to_owned())]
    }

    /// The name of the active profile.
    pub fn active_profile_name(&self) -> &str {
        &self.active
    }

    /// All profile names, "Original" included.
    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(|s| s.as_str()).collect()
    }

    /// The text to display for a row: the active profile's entry,
    /// falling back to "Original", falling back to the empty string.
    pub fn get_display_text(&self, row: &TextRow) -> String {
        let key = row.key();
        let lookup = |profile: &str| -> Option<&String> {
            self.profiles
                .get(profile)?
                .get(&row.filename)?
                .get(&key)
        };
        lookup(&self.active)
            .or_else(|| lookup(ORIGINAL_PROFILE))
            .cloned()
            .unwrap_or_default()
    }

    /// If "Original" is active, fork a full copy of it into the first
    /// free "User Edit N" name and switch to that. Edits must never
    /// land in "Original".
    fn ensure_edit_profile(&mut self, events: &mut Vec<ProfileEvent>) {
        if self.active != ORIGINAL_PROFILE {
            return;
        }
        let mut i = 1;
        let name = loop {
            let candidate = format!("User Edit {}", i);
            if !self.profiles.contains_key(&candidate) {
                break candidate;
            }
            i += 1;
        };
        let copy = self
            .profiles
            .get(ORIGINAL_PROFILE)
            .expect("Original profile always exists")
            .clone();
        self.profiles.insert(name.clone(), copy);
        self.active = name.clone();
        events.push(ProfileEvent::ProfilesUpdated);
        events.push(ProfileEvent::ActiveProfileChanged(name.clone()));
        events.push(ProfileEvent::EditProfileCreated(name));
    }

    /// Update the text of a row in the active profile, forking an edit
    /// profile first if "Original" is active. An unknown row number is
    /// a logged no-op.
    pub fn update_text(
        &mut self,
        rows: &RowStore,
        row_number: f64,
        new_text: &str,
    ) -> Vec<ProfileEvent> {
        let Some(row) = rows.find_by_row_number(row_number) else {
            warn!("no row {} to update", row_key(row_number));
            return vec![];
        };
        let filename = row.filename.clone();
        let key = row.key();

        let mut events = vec![];
        self.ensure_edit_profile(&mut events);
        self.profiles
            .get_mut(&self.active)
            .expect("active profile always exists")
            .entry(filename)
            .or_default()
            .insert(key, new_text.to_owned());
        events
    }

    /// Record the combined text of several rows under the first row's
    /// key, with the same forking behavior as `update_text`. Deleting
    /// the other combined rows is the row store's responsibility, not
    /// ours.
    pub fn combine_rows(
        &mut self,
        rows: &RowStore,
        first_row_number: f64,
        combined_text: &str,
    ) -> Vec<ProfileEvent> {
        self.update_text(rows, first_row_number, combined_text)
    }

    /// Invert the profile set (excluding "Original") into a
    /// per-(filename, row key) map of profile name → text, used when
    /// saving a project.
    pub fn get_translations_for_save(
        &self,
    ) -> BTreeMap<(String, String), BTreeMap<String, String>> {
        let mut by_key: BTreeMap<(String, String), BTreeMap<String, String>> = BTreeMap::new();
        for (profile_name, data) in &self.profiles {
            if profile_name == ORIGINAL_PROFILE {
                continue;
            }
            for (filename, row_texts) in data {
                for (key, text) in row_texts {
                    by_key
                        .entry((filename.clone(), key.clone()))
                        .or_default()
                        .insert(profile_name.clone(), text.clone());
                }
            }
        }
        by_key
    }
}
