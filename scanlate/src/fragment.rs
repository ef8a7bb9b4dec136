//! Raw OCR detections, before grouping.

use log::warn;
use serde::Deserialize;

use crate::geom::{Point, Rect};

/// One raw OCR detection: a quadrilateral, the recognized text, and
/// the detector's confidence. Fragments are ephemeral; they exist only
/// between the detector and the grouping engine.
#[derive(Clone, Debug, PartialEq)]
pub struct TextFragment {
    /// The detected quadrilateral, in original-image pixel space.
    pub coordinates: [Point; 4],
    /// The recognized text.
    pub text: String,
    /// Detector confidence, in `[0, 1]`.
    pub confidence: f32,
}

impl TextFragment {
    /// The axis-aligned bounding box of this fragment's quadrilateral.
    pub fn bounding_box(&self) -> Rect {
        // The polygon always has four points, so this can't fail.
        Rect::bounding(&self.coordinates).expect("polygon has no points")
    }

    /// The height of this fragment's bounding box, used by the
    /// caller-side size filter.
    pub fn height(&self) -> i32 {
        self.bounding_box().height()
    }
}

/// A detection as produced by the OCR layer: a polygon (any arity, not
/// yet validated), the text, and a confidence. Deserializes from the
/// `[polygon, text, confidence]` triples detectors emit.
#[derive(Clone, Debug, Deserialize)]
pub struct RawDetection(
    /// The detected polygon, not yet validated.
    pub Vec<(f64, f64)>,
    /// The recognized text.
    pub String,
    /// Detector confidence.
    pub f32,
);

impl RawDetection {
    /// Validate this detection and convert it to a `TextFragment`,
    /// scaling coordinates back to original-image space.
    ///
    /// `scale_x` and `scale_y` are the inverse of the resize ratio
    /// applied before detection (use `1.0` when the image was not
    /// resized). Scaled coordinates are truncated to integers.
    /// Malformed detections (wrong polygon arity, non-finite values)
    /// are rejected with a logged warning rather than failing the
    /// whole batch.
    pub fn into_fragment(self, scale_x: f64, scale_y: f64) -> Option<TextFragment> {
        let RawDetection(polygon, text, confidence) = self;
        if polygon.len() != 4 {
            warn!(
                "skipping detection with {} polygon points: {:?}",
                polygon.len(),
                text
            );
            return None;
        }
        let mut coordinates = [Point::new(0, 0); 4];
        for (out, (x, y)) in coordinates.iter_mut().zip(&polygon) {
            let x = x * scale_x;
            let y = y * scale_y;
            if !x.is_finite() || !y.is_finite() {
                warn!("skipping detection with non-finite coordinates: {:?}", text);
                return None;
            }
            *out = Point::new(x as i32, y as i32);
        }
        Some(TextFragment {
            coordinates,
            text,
            confidence,
        })
    }
}

/// Convert a batch of raw detections to fragments, dropping malformed
/// entries, and apply the standard pre-grouping filters: bounding-box
/// height within `[min_text_height, max_text_height]` and confidence
/// of at least `min_confidence`.
///
/// Every grouping call site filters before merging, so this lives next
/// to the conversion rather than inside the grouping engine.
pub fn filter_detections(
    detections: Vec<RawDetection>,
    scale_x: f64,
    scale_y: f64,
    min_text_height: i32,
    max_text_height: i32,
    min_confidence: f32,
) -> Vec<TextFragment> {
    detections
        .into_iter()
        .filter_map(|raw| raw.into_fragment(scale_x, scale_y))
        .filter(|frag| {
            let height = frag.height();
            height >= min_text_height
                && height <= max_text_height
                && frag.confidence >= min_confidence
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn detection(points: &[(f64, f64)], text: &str, confidence: f32) -> RawDetection {
        RawDetection(points.to_vec(), text.to_owned(), confidence)
    }

    #[test]
    fn malformed_polygons_are_dropped() {
        let bad_arity = detection(&[(0.0, 0.0), (10.0, 0.0)], "two points", 0.9);
        assert!(bad_arity.into_fragment(1.0, 1.0).is_none());

        let non_finite = detection(
            &[(0.0, 0.0), (f64::NAN, 0.0), (10.0, 10.0), (0.0, 10.0)],
            "nan",
            0.9,
        );
        assert!(non_finite.into_fragment(1.0, 1.0).is_none());
    }

    #[test]
    fn scaling_truncates_to_integers() {
        let raw = detection(
            &[(1.0, 2.0), (10.0, 2.0), (10.0, 7.0), (1.0, 7.0)],
            "hi",
            0.9,
        );
        let frag = raw.into_fragment(1.5, 2.5).unwrap();
        assert_eq!(frag.coordinates[0], Point::new(1, 5));
        assert_eq!(frag.coordinates[2], Point::new(15, 17));
    }

    #[test]
    fn filters_height_and_confidence() {
        let detections = vec![
            detection(&[(0.0, 0.0), (10.0, 0.0), (10.0, 20.0), (0.0, 20.0)], "keep", 0.9),
            detection(&[(0.0, 0.0), (10.0, 0.0), (10.0, 2.0), (0.0, 2.0)], "too short", 0.9),
            detection(
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 500.0), (0.0, 500.0)],
                "too tall",
                0.9,
            ),
            detection(
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 20.0), (0.0, 20.0)],
                "low confidence",
                0.1,
            ),
        ];
        let fragments = filter_detections(detections, 1.0, 1.0, 5, 100, 0.5);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "keep");
    }

    #[test]
    fn raw_detection_from_json() {
        let json = r#"[[[0, 0], [10, 0], [10, 5], [0, 5]], "hello", 0.87]"#;
        let raw: RawDetection = serde_json::from_str(json).unwrap();
        let frag = raw.into_fragment(1.0, 1.0).unwrap();
        assert_eq!(frag.text, "hello");
        assert_eq!(frag.bounding_box().height(), 5);
    }
}
