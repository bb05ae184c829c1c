//! Visual regression testing with screenshot comparison

use std::path::{Path, PathBuf};
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Sha256, Digest};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_DIFF_THRESHOLD;
use crate::error::{E2eError, E2eResult};
use crate::snapshot::{SnapshotPaths, SnapshotStore};

/// Result of a visual comparison
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Mean absolute channel difference, 0.0 (identical) to 1.0 (inverted)
    pub ratio: f64,

    /// Diff image left on disk (only when the change is meaningful)
    pub diff_image_path: Option<PathBuf>,

    /// Whether the pair had to be converted to a common pixel format
    pub normalized: bool,

    /// Hash of the candidate screenshot as compared
    pub candidate_hash: String,

    /// Hash of the reference screenshot as compared
    pub reference_hash: String,
}

impl DiffOutcome {
    pub fn is_regression(&self) -> bool {
        self.diff_image_path.is_some()
    }
}

/// Pixel-wise comparison of a candidate against its reference
#[derive(Debug, Clone)]
pub struct Differ {
    /// Ratios strictly below this are treated as "no change"
    threshold: f64,
}

impl Default for Differ {
    fn default() -> Self {
        Self::new(DEFAULT_DIFF_THRESHOLD)
    }
}

impl Differ {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare the candidate of `paths` with its reference.
    ///
    /// Writes the diff visualization to `paths.diff` and removes it again
    /// when the ratio is negligible. If the two files use different pixel
    /// formats, both are re-encoded as RGB in place before comparing.
    ///
    /// A diff left over from an earlier run is removed up front, so a
    /// failing comparison never leaves one behind.
    pub fn compare(&self, store: &SnapshotStore, paths: &SnapshotPaths) -> E2eResult<DiffOutcome> {
        store.delete_diff(&paths.diff)?;

        let reference_hash = hash_file(&paths.reference)?;
        let candidate_hash = hash_file(&paths.candidate)?;

        let reference = decode(&paths.reference)?;
        let candidate = decode(&paths.candidate)?;

        // Byte-identical files that decode fine need no pixel walk
        if reference_hash == candidate_hash {
            debug!("Screenshots match exactly (same hash)");
            return Ok(DiffOutcome {
                ratio: 0.0,
                diff_image_path: None,
                normalized: false,
                candidate_hash,
                reference_hash,
            });
        }

        let normalized = reference.color() != candidate.color();
        let (reference, candidate) = if normalized {
            info!(
                "Normalizing color modes ({:?} vs {:?}) to RGB",
                reference.color(),
                candidate.color()
            );
            let reference = reference.to_rgb8();
            let candidate = candidate.to_rgb8();
            reference.save(&paths.reference)?;
            candidate.save(&paths.candidate)?;
            (reference, candidate)
        } else {
            (reference.to_rgb8(), candidate.to_rgb8())
        };

        let (ratio, diff_img) = difference_ratio(&reference, &candidate)?;

        diff_img.save(&paths.diff)?;

        let diff_image_path = if ratio < self.threshold {
            store.delete_diff(&paths.diff)?;
            None
        } else {
            warn!(
                "Visual change detected: ratio {:.6} (diff at {})",
                ratio,
                paths.diff.display()
            );
            Some(paths.diff.clone())
        };

        Ok(DiffOutcome {
            ratio,
            diff_image_path,
            normalized,
            candidate_hash: if normalized { hash_file(&paths.candidate)? } else { candidate_hash },
            reference_hash: if normalized { hash_file(&paths.reference)? } else { reference_hash },
        })
    }
}

/// Mean absolute difference over the R, G and B channels of two equally
/// sized images, scaled to `[0, 1]`, plus the per-channel difference image.
pub fn difference_ratio(reference: &RgbImage, candidate: &RgbImage) -> E2eResult<(f64, RgbImage)> {
    if reference.dimensions() != candidate.dimensions() {
        return Err(E2eError::DimensionMismatch {
            reference: reference.dimensions(),
            candidate: candidate.dimensions(),
        });
    }

    let (width, height) = reference.dimensions();
    let mut diff_img = RgbImage::new(width, height);
    let mut total: u64 = 0;

    for (x, y, a) in reference.enumerate_pixels() {
        let b = candidate.get_pixel(x, y);
        let delta = [
            a[0].abs_diff(b[0]),
            a[1].abs_diff(b[1]),
            a[2].abs_diff(b[2]),
        ];
        total += delta.iter().map(|&d| d as u64).sum::<u64>();
        diff_img.put_pixel(x, y, Rgb(delta));
    }

    let pixels = width as u64 * height as u64;
    if pixels == 0 {
        return Ok((0.0, diff_img));
    }

    let ratio = total as f64 / (255.0 * 3.0 * pixels as f64);
    Ok((ratio, diff_img))
}

fn decode(path: &Path) -> E2eResult<DynamicImage> {
    image::open(path).map_err(|e| E2eError::Decode {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path).map_err(|e| E2eError::Decode {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
