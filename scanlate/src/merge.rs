//! Grouping of OCR fragments into merged text rows.
//!
//! Detectors return one fragment per line (or per glyph run), but a
//! speech balloon or caption is one logical block. We join fragments
//! whose bounding boxes are within `distance_threshold` pixels of each
//! other, transitively, and merge each connected component into a
//! single row with a union bounding box and reading-order text.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    fragment::TextFragment,
    geom::Rect,
    rows::TextRow,
};

/// Union-find over fragment indices, used to build connected
/// components of the proximity relation.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> UnionFind {
        UnionFind {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Group fragments of a single image into merged text rows.
///
/// Fragments must already be filtered (height and confidence bounds
/// are the caller's responsibility; see
/// [`crate::fragment::filter_detections`]). Two fragments belong to
/// the same row when the gap between their bounding boxes is at most
/// `distance_threshold` pixels, directly or through a chain of other
/// fragments.
///
/// Row numbers are assigned sequentially from `base_row_number`, in
/// reading order of the merged blocks. The caller picks a base that
/// doesn't collide with existing rows for this file, typically
/// [`crate::rows::RowStore::next_row_base`].
pub fn group_and_merge(
    fragments: Vec<TextFragment>,
    filename: &str,
    distance_threshold: i32,
    base_row_number: i64,
    is_manual: bool,
) -> Vec<TextRow> {
    // Degenerate boxes can't participate in distance calculations in
    // any meaningful way, so drop them up front.
    let fragments: Vec<TextFragment> = fragments
        .into_iter()
        .filter(|frag| {
            let keep = !frag.bounding_box().is_empty();
            if !keep {
                debug!("dropping zero-area fragment: {:?}", frag.text);
            }
            keep
        })
        .collect();
    if fragments.is_empty() {
        return vec![];
    }

    let boxes: Vec<Rect> = fragments.iter().map(|f| f.bounding_box()).collect();
    let threshold = f64::from(distance_threshold.max(0));

    let mut components = UnionFind::new(fragments.len());
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if boxes[i].gap_to(&boxes[j]) <= threshold {
                components.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..fragments.len() {
        let root = components.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut merged: Vec<(Rect, TextRow)> = groups
        .into_values()
        .map(|members| merge_group(&fragments, &boxes, members, filename, is_manual))
        .collect();

    // Number the merged blocks in reading order of their boxes, so row
    // order on screen matches row numbers.
    merged.sort_by_key(|(bbox, _)| (bbox.top(), bbox.left()));
    for (i, (_, row)) in merged.iter_mut().enumerate() {
        row.row_number = (base_row_number + i as i64) as f64;
    }
    merged.into_iter().map(|(_, row)| row).collect()
}

/// Merge one connected component of fragments into a single row.
fn merge_group(
    fragments: &[TextFragment],
    boxes: &[Rect],
    mut members: Vec<usize>,
    filename: &str,
    is_manual: bool,
) -> (Rect, TextRow) {
    // Reading order: top-to-bottom, then left-to-right.
    members.sort_by_key(|&i| (boxes[i].top(), boxes[i].left()));

    let mut text = String::new();
    let mut line_counts = 0u32;
    let mut bbox: Option<Rect> = None;
    let mut confidence_sum = 0.0f32;
    let mut prev_box: Option<Rect> = None;

    for &i in &members {
        let frag = &fragments[i];
        let frag_text = frag.text.trim();
        if !frag_text.is_empty() {
            if !text.is_empty() {
                // Fragments sharing a vertical band are on the same
                // text line; anything else starts a new line.
                let same_line = prev_box
                    .map(|p| p.overlaps_vertically(&boxes[i]))
                    .unwrap_or(false);
                text.push(if same_line { ' ' } else { '\n' });
            }
            text.push_str(frag_text);
            line_counts += frag_text.split('\n').count() as u32;
            prev_box = Some(boxes[i]);
        }
        confidence_sum += frag.confidence;
        bbox = Some(match bbox {
            Some(b) => b.union(&boxes[i]),
            None => boxes[i],
        });
    }

    let bbox = bbox.expect("merge group is never empty");
    let row = TextRow {
        filename: filename.to_owned(),
        row_number: 0.0, // assigned by the caller, in reading order
        coordinates: bbox.corners(),
        text,
        confidence: confidence_sum / members.len() as f32,
        line_counts,
        is_deleted: false,
        is_manual,
        translations: BTreeMap::new(),
        custom_style: None,
    };
    (bbox, row)
}
