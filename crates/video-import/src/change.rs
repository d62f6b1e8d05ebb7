//! Cheap pixel-difference gate in front of the matcher.

use image::GrayImage;

pub const DEFAULT_CHANGE_THRESHOLD: f64 = 5.0;

/// Mean absolute pixel difference, `None` when the sizes differ.
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let raw = a.as_raw();
    if raw.is_empty() {
        return Some(0.0);
    }
    let total: u64 = raw
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    Some(total as f64 / raw.len() as f64)
}

/// True when there is no previous crop, the sizes differ, or the mean
/// absolute difference exceeds `threshold`.
pub fn changed(previous: Option<&GrayImage>, current: &GrayImage, threshold: f64) -> bool {
    match previous.map(|prev| mean_abs_diff(prev, current)) {
        None | Some(None) => true,
        Some(Some(diff)) => diff > threshold,
    }
}

/// Holds the crop that was last classified, the only frame buffer kept
/// across iterations.
#[derive(Debug)]
pub struct ChangeDetector {
    threshold: f64,
    baseline: Option<GrayImage>,
}

impl ChangeDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            baseline: None,
        }
    }

    pub fn has_changed(&self, current: &GrayImage) -> bool {
        changed(self.baseline.as_ref(), current, self.threshold)
    }

    /// Make `crop` the new comparison baseline.
    pub fn update(&mut self, crop: GrayImage) {
        self.baseline = Some(crop);
    }

    pub fn release(&mut self) {
        self.baseline = None;
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{render_board, CELL};
    use chess_core::fen::STANDARD_START_BOARD;
    use image::Luma;

    #[test]
    fn test_first_crop_always_changed() {
        let crop = GrayImage::from_pixel(8, 8, Luma([10]));
        assert!(changed(None, &crop, DEFAULT_CHANGE_THRESHOLD));
        assert!(ChangeDetector::default().has_changed(&crop));
    }

    #[test]
    fn test_identical_crops_unchanged() {
        let crop = GrayImage::from_pixel(8, 8, Luma([10]));
        assert!(!changed(Some(&crop.clone()), &crop, DEFAULT_CHANGE_THRESHOLD));
        // Even a zero threshold does not flag identical pixels.
        assert!(!changed(Some(&crop.clone()), &crop, 0.0));
    }

    #[test]
    fn test_threshold_boundary() {
        let prev = GrayImage::from_pixel(4, 4, Luma([100]));
        let at = GrayImage::from_pixel(4, 4, Luma([105]));
        let above = GrayImage::from_pixel(4, 4, Luma([106]));
        assert!(!changed(Some(&prev), &at, 5.0));
        assert!(changed(Some(&prev), &above, 5.0));

        // One pixel moved far enough to lift the mean just over the threshold.
        let mut spike = prev.clone();
        spike.put_pixel(0, 0, Luma([181]));
        assert_eq!(mean_abs_diff(&prev, &spike), Some(81.0 / 16.0));
        assert!(changed(Some(&prev), &spike, 5.0));
    }

    #[test]
    fn test_size_change_is_change() {
        let prev = GrayImage::from_pixel(4, 4, Luma([100]));
        let bigger = GrayImage::from_pixel(5, 4, Luma([100]));
        assert!(changed(Some(&prev), &bigger, 5.0));
    }

    #[test]
    fn test_single_move_trips_default_threshold() {
        let start = render_board(STANDARD_START_BOARD, CELL);
        let after_d4 = render_board("rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR", CELL);
        let after_d5 = render_board("rnbqkbnr/ppp1pppp/8/3p4/3P4/8/PPP1PPPP/RNBQKBNR", CELL);

        // Two 784 px pawn silhouettes, 225 apart from the dark square.
        assert_eq!(mean_abs_diff(&start, &after_d4), Some(6.125));
        assert!(changed(Some(&start), &after_d4, DEFAULT_CHANGE_THRESHOLD));
        assert!(changed(Some(&after_d4), &after_d5, DEFAULT_CHANGE_THRESHOLD));
        assert!(!changed(Some(&after_d4), &after_d4.clone(), DEFAULT_CHANGE_THRESHOLD));
    }

    #[test]
    fn test_detector_baseline() {
        let mut detector = ChangeDetector::new(5.0);
        let a = GrayImage::from_pixel(4, 4, Luma([50]));
        detector.update(a.clone());
        assert!(!detector.has_changed(&a));
        assert!(detector.has_changed(&GrayImage::from_pixel(4, 4, Luma([90]))));

        detector.release();
        assert!(detector.has_changed(&a));
    }
}
