//! The translation exchange format.
//!
//! Rows are shipped to an external translator as loosely-XML tagged
//! text and come back the same way, usually after passing through a
//! text-generation model that cannot be trusted to produce well-formed
//! markup. Export is strict; import is a deliberately permissive
//! line-oriented scanner that skips anything it doesn't recognize. A
//! real XML parser would reject exactly the malformed input this
//! format exists to tolerate.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::{
    profiles::ORIGINAL_PROFILE,
    rows::{normalize_row_key, TextRow},
};

/// Tag names with structural meaning, never interpretable as
/// filenames.
const RESERVED_TAGS: &[&str] = &["translations", "translate", "context", "re-translation"];

/// Escape text for inclusion in an exchange document.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Undo `escape`, plus the quote entities other tools like to emit.
pub fn unescape(text: &str) -> String {
    // "&amp;" must be decoded last so "&amp;lt;" comes out as "&lt;".
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// The text a row contributes to an export, for a given source
/// profile: the profile's entry in the row's saved translations,
/// falling back to the OCR text for "Original" or missing entries.
fn text_for_profile<'a>(row: &'a TextRow, profile: &str) -> &'a str {
    if profile != ORIGINAL_PROFILE {
        if let Some(text) = row.translations.get(profile) {
            return text;
        }
    }
    &row.text
}

/// Visible rows grouped by filename, each file's rows sorted
/// numerically by row number. The common first step of both export
/// modes. Rows without a filename can't be addressed on the way back
/// in, so they are silently skipped.
fn visible_rows_by_file(rows: &[TextRow]) -> BTreeMap<&str, Vec<&TextRow>> {
    let mut by_file: BTreeMap<&str, Vec<&TextRow>> = BTreeMap::new();
    for row in rows {
        if row.is_deleted || row.filename.is_empty() {
            continue;
        }
        by_file.entry(&row.filename).or_default().push(row);
    }
    for file_rows in by_file.values_mut() {
        file_rows.sort_by(|a, b| {
            a.row_number
                .partial_cmp(&b.row_number)
                .expect("row numbers should never be NaN")
        });
    }
    by_file
}

/// Generate the full exchange document for a set of rows: one tag per
/// filename, one numbered tag per visible, non-blank row, using the
/// named profile's text.
pub fn generate_for_translate_content(rows: &[TextRow], source_profile: &str) -> String {
    let mut content = String::from("<translations>\n");
    for (filename, file_rows) in visible_rows_by_file(rows) {
        let escaped_filename = escape(filename);
        content.push_str(&format!("<{}>\n", escaped_filename));
        for row in file_rows {
            let text = text_for_profile(row, source_profile);
            if text.trim().is_empty() {
                continue;
            }
            let key = row.key();
            content.push_str(&format!("<{}>{}</{}>\n", key, escape(text), key));
        }
        content.push_str(&format!("</{}>\n", escaped_filename));
    }
    content.push_str("</translations>\n");
    content
}

/// Generate a selective re-translation document.
///
/// `selections` is a list of `(filename, row key)` pairs. Within each
/// file, selected rows whose context windows (`context_size` rows on
/// either side) overlap are merged into a single `<re-translation>`
/// block covering the union window; selected rows keep their numbered
/// tags (to be translated), while the surrounding rows in the window
/// are emitted as `<context>` tags (for the translator's eyes only).
pub fn generate_retranslate_content(
    rows: &[TextRow],
    source_profile: &str,
    selections: &[(String, String)],
    context_size: usize,
) -> String {
    let by_file = visible_rows_by_file(rows);

    let mut selected_by_file: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (filename, key) in selections {
        selected_by_file
            .entry(filename.as_str())
            .or_default()
            .push(normalize_row_key(key));
    }

    let mut content = String::from("<translations>\n");
    for (filename, selected_keys) in selected_by_file {
        let Some(file_rows) = by_file.get(filename) else {
            warn!("no visible rows for selected file {:?}", filename);
            continue;
        };

        // Map selections to positions in the sorted row list.
        let mut selected_indices: Vec<usize> = selected_keys
            .iter()
            .filter_map(|key| {
                let idx = file_rows.iter().position(|r| r.key() == *key);
                if idx.is_none() {
                    warn!("selected row {:?} not found in {:?}", key, filename);
                }
                idx
            })
            .collect();
        selected_indices.sort_unstable();
        selected_indices.dedup();
        if selected_indices.is_empty() {
            continue;
        }

        let escaped_filename = escape(filename);
        content.push_str(&format!("<{}>\n", escaped_filename));

        // Merge selections whose context windows overlap into one
        // group, so the translator sees each stretch of the page once.
        let mut groups: Vec<Vec<usize>> = vec![vec![selected_indices[0]]];
        for &idx in &selected_indices[1..] {
            let prev = *groups.last().unwrap().last().unwrap();
            if idx - prev < 2 * context_size {
                groups.last_mut().unwrap().push(idx);
            } else {
                groups.push(vec![idx]);
            }
        }

        for group in groups {
            let first = *group.first().unwrap();
            let last = *group.last().unwrap();
            let start = first.saturating_sub(context_size);
            let end = (last + context_size).min(file_rows.len() - 1);

            content.push_str("<re-translation>\n");
            for idx in start..=end {
                let row = file_rows[idx];
                let text = escape(text_for_profile(row, source_profile));
                if group.contains(&idx) {
                    let key = row.key();
                    content.push_str(&format!("<{}>{}</{}>\n", key, text, key));
                } else {
                    content.push_str(&format!("<context>{}</context>\n", text));
                }
            }
            content.push_str("</re-translation>\n");
        }

        content.push_str(&format!("</{}>\n", escaped_filename));
    }
    content.push_str("</translations>\n");
    content
}

lazy_static! {
    /// A numbered opening tag at the start of a line: an integer or
    /// decimal row number.
    static ref ROW_TAG: Regex = Regex::new(r"^<(\d+(?:\.\d+)?)>").unwrap();
    /// Any other opening tag at the start of a line; candidate
    /// filename.
    static ref OPEN_TAG: Regex = Regex::new(r"^<([^/>][^>]*)>").unwrap();
    /// A `<translate>` span inside row content; the closing tag is
    /// optional.
    static ref TRANSLATE_SPAN: Regex =
        Regex::new(r"(?is)<translate>(.*?)(?:</translate>|$)").unwrap();
}

/// Parse a returned exchange document into `filename → row key →
/// text`.
///
/// This never fails: unrecognized lines, stray closing tags, reserved
/// wrapper tags, and missing closing tags are all tolerated, because
/// the document has usually been rewritten by a translation model.
/// Row tags bind to the most recently seen filename tag.
pub fn import_translation_file_content(
    content: &str,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut translations: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current_filename: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // A numbered tag is always a row entry, never a filename.
        if let Some(row_match) = ROW_TAG.captures(line) {
            let Some(filename) = &current_filename else {
                warn!("row tag before any filename tag: {:?}", line);
                continue;
            };
            let row_number = row_match.get(1).unwrap().as_str();

            // Take everything up to the matching closing tag, or to
            // the end of the line if the closing tag went missing.
            let content_start = row_match.get(0).unwrap().end();
            let closing_tag = format!("</{}>", row_number);
            let line_content = match line.rfind(&closing_tag) {
                Some(end) if end >= content_start => &line[content_start..end],
                _ => &line[content_start..],
            };

            // Prefer an inner <translate> span when present.
            let text = match TRANSLATE_SPAN.captures(line_content) {
                Some(caps) => caps.get(1).unwrap().as_str(),
                None => line_content,
            };
            let text = unescape(text).trim().to_owned();
            if !text.is_empty() {
                translations
                    .entry(filename.clone())
                    .or_default()
                    .insert(normalize_row_key(row_number), text);
            }
            continue;
        }

        // Any other opening tag becomes the current filename, unless
        // it's one of our structural tags.
        if let Some(file_match) = OPEN_TAG.captures(line) {
            let name = file_match.get(1).unwrap().as_str();
            if RESERVED_TAGS.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            let filename = unescape(name);
            translations.entry(filename.clone()).or_default();
            current_filename = Some(filename);
        }

        // Everything else (closing tags, prose, noise) is ignored.
    }

    translations
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Point;

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
    fn escape_round_trips() {
        let nasty = "a < b & b > c \"quoted\"";
        assert_eq!(unescape(&escape(nasty)), nasty);
        assert_eq!(escape("<&>"), "&lt;&amp;&gt;");
    }

    #[test]
    fn full_export_shape() {
        let rows = vec![
            row("p1.png", 1.0, "Hello"),
            row("p1.png", 2.0, "World"),
            row("p2.png", 3.0, "Again"),
        ];
        let content = generate_for_translate_content(&rows, ORIGINAL_PROFILE);
        assert_eq!(
            content,
            "<translations>\n\
             <p1.png>\n\
             <1>Hello</1>\n\
             <2>World</2>\n\
             </p1.png>\n\
             <p2.png>\n\
             <3>Again</3>\n\
             </p2.png>\n\
             </translations>\n"
        );
    }

    #[test]
    fn export_skips_deleted_and_blank_rows() {
        let mut deleted = row("p1.png", 1.0, "gone");
        deleted.is_deleted = true;
        let rows = vec![deleted, row("p1.png", 2.0, "   "), row("p1.png", 3.0, "kept")];
        let content = generate_for_translate_content(&rows, ORIGINAL_PROFILE);
        assert!(!content.contains("gone"));
        assert!(!content.contains("<2>"));
        assert!(content.contains("<3>kept</3>"));
    }

    #[test]
    fn export_sorts_rows_numerically_not_lexically() {
        let rows = vec![
            row("p1.png", 10.0, "ten"),
            row("p1.png", 2.0, "two"),
            row("p1.png", 2.5, "two and a half"),
        ];
        let content = generate_for_translate_content(&rows, ORIGINAL_PROFILE);
        let two = content.find("<2>").unwrap();
        let two_half = content.find("<2.5>").unwrap();
        let ten = content.find("<10>").unwrap();
        assert!(two < two_half && two_half < ten);
    }

    #[test]
    fn export_uses_source_profile_with_fallback() {
        let mut translated = row("p1.png", 1.0, "original");
        translated
            .translations
            .insert("French".to_owned(), "traduit".to_owned());
        let rows = vec![translated, row("p1.png", 2.0, "untranslated")];
        let content = generate_for_translate_content(&rows, "French");
        assert!(content.contains("<1>traduit</1>"));
        assert!(content.contains("<2>untranslated</2>"));
    }

    #[test]
    fn round_trip_through_import() {
        let rows = vec![row("p1.png", 1.0, "Hello"), row("p1.png", 2.0, "World")];
        let content = generate_for_translate_content(&rows, ORIGINAL_PROFILE);
        let imported = import_translation_file_content(&content);
        assert_eq!(imported.len(), 1);
        assert_eq!(imported["p1.png"]["1"], "Hello");
        assert_eq!(imported["p1.png"]["2"], "World");
    }

    #[test]
    fn import_tolerates_missing_closing_tags() {
        let imported = import_translation_file_content("<file.png>\n<3>Hi there");
        assert_eq!(imported["file.png"]["3"], "Hi there");
    }

    #[test]
    fn import_recognizes_decimal_row_tags() {
        let imported = import_translation_file_content("<file.png>\n<3.5>Between</3.5>");
        assert_eq!(imported["file.png"]["3.5"], "Between");
    }

    #[test]
    fn import_normalizes_row_keys() {
        let imported = import_translation_file_content("<file.png>\n<3.0>Hi</3.0>");
        assert_eq!(imported["file.png"]["3"], "Hi");
    }

    #[test]
    fn import_prefers_translate_span() {
        let doc = "<file.png>\n<1><translate>Inner</translate> trailing</1>\n<2><translate>No closing";
        let imported = import_translation_file_content(doc);
        assert_eq!(imported["file.png"]["1"], "Inner");
        assert_eq!(imported["file.png"]["2"], "No closing");
    }

    #[test]
    fn import_skips_reserved_and_unknown_lines() {
        let doc = "<translations>\n\
                   Some model chatter.\n\
                   </nonsense>\n\
                   <re-translation>\n\
                   <file.png>\n\
                   <context>ignored context</context>\n\
                   <1>Kept</1>\n\
                   </file.png>\n\
                   </translations>\n";
        let imported = import_translation_file_content(doc);
        assert_eq!(imported.len(), 1);
        assert_eq!(imported["file.png"].len(), 1);
        assert_eq!(imported["file.png"]["1"], "Kept");
    }

    #[test]
    fn import_unescapes_entities() {
        let imported =
            import_translation_file_content("<file.png>\n<1>a &lt; b &amp; c &gt; d</1>");
        assert_eq!(imported["file.png"]["1"], "a < b & c > d");
    }

    #[test]
    fn import_binds_rows_to_latest_filename() {
        let doc = "<a.png>\n<1>First</1>\n<b.png>\n<1>Second</1>";
        let imported = import_translation_file_content(doc);
        assert_eq!(imported["a.png"]["1"], "First");
        assert_eq!(imported["b.png"]["1"], "Second");
    }

    #[test]
    fn import_never_fails_on_noise() {
        let imported =
            import_translation_file_content("<>\n</>\n</123>\n<1>orphan row\nplain chatter");
        assert!(imported.is_empty());
    }

    #[test]
    fn retranslate_merges_overlapping_windows() {
        let rows: Vec<TextRow> = (1..=5)
            .map(|i| row("p1.png", i as f64, &format!("line {}", i)))
            .collect();
        let selections = vec![
            ("p1.png".to_owned(), "1".to_owned()),
            ("p1.png".to_owned(), "2".to_owned()),
            ("p1.png".to_owned(), "4".to_owned()),
        ];
        let content = generate_retranslate_content(&rows, ORIGINAL_PROFILE, &selections, 1);

        // Rows 1 and 2 share a group; row 4 is on its own.
        assert_eq!(content.matches("<re-translation>").count(), 2);

        let first_group_end = content.find("</re-translation>").unwrap();
        let first_group = &content[..first_group_end];
        assert!(first_group.contains("<1>line 1</1>"));
        assert!(first_group.contains("<2>line 2</2>"));
        assert!(first_group.contains("<context>line 3</context>"));
        assert!(!first_group.contains("<4>"));

        let second_group = &content[first_group_end..];
        assert!(second_group.contains("<4>line 4</4>"));
        assert!(second_group.contains("<context>line 3</context>"));
        assert!(second_group.contains("<context>line 5</context>"));
    }

    #[test]
    fn retranslate_clips_windows_to_valid_rows() {
        let rows = vec![row("p1.png", 1.0, "only")];
        let selections = vec![("p1.png".to_owned(), "1".to_owned())];
        let content = generate_retranslate_content(&rows, ORIGINAL_PROFILE, &selections, 3);
        assert!(content.contains("<1>only</1>"));
        assert!(!content.contains("<context>"));
    }

    #[test]
    fn retranslate_skips_unknown_selections() {
        let rows = vec![row("p1.png", 1.0, "a")];
        let selections = vec![
            ("p1.png".to_owned(), "9".to_owned()),
            ("missing.png".to_owned(), "1".to_owned()),
        ];
        let content = generate_retranslate_content(&rows, ORIGINAL_PROFILE, &selections, 1);
        assert!(!content.contains("<re-translation>"));
    }
}
