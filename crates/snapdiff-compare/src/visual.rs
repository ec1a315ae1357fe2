//! Screenshot comparison: DCT perceptual hash distance and mean SSIM.
//!
//! The hash reproduces imagehash's `phash` (32x32 grayscale, 8x8 low-frequency
//! DCT block, median threshold). The similarity reproduces scikit-image's
//! `structural_similarity` defaults (7x7 uniform window, K1 0.01, K2 0.03,
//! sample covariance, mean over windows that fit the image).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSimilarity {
    /// Hamming distance between 64-bit perceptual hashes; larger is more different.
    pub perceptual_distance: u32,
    /// Mean structural similarity in `[-1, 1]`; 1 means identical.
    pub similarity: f64,
}

#[derive(Debug, Error)]
pub enum VisualError {
    #[error("decoding image: {0}")]
    Decode(String),
    #[error("image {width}x{height} is smaller than the {window}x{window} similarity window")]
    TooSmall { width: u32, height: u32, window: u32 },
}

/// Perceptual comparison of two encoded images. Implementations resize the
/// second image to the first when their dimensions differ.
pub trait VisualComparator: Send + Sync {
    fn compare(&self, first: &[u8], second: &[u8]) -> Result<ImageSimilarity, VisualError>;
}

/// The comparator compiled into this build, if any.
pub fn default_comparator() -> Option<Box<dyn VisualComparator>> {
    #[cfg(feature = "visual")]
    {
        Some(Box::new(ImageComparator))
    }
    #[cfg(not(feature = "visual"))]
    {
        None
    }
}

#[cfg(feature = "visual")]
pub use backend::ImageComparator;

#[cfg(feature = "visual")]
mod backend {
    use image::imageops::{self, FilterType};
    use image::GrayImage;

    use super::{ImageSimilarity, VisualComparator, VisualError};

    const HASH_SIDE: usize = 32;
    const LOW_FREQ_SIDE: usize = 8;
    const SSIM_WINDOW: usize = 7;
    const SSIM_K1: f64 = 0.01;
    const SSIM_K2: f64 = 0.03;
    const DATA_RANGE: f64 = 255.0;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct ImageComparator;

    impl VisualComparator for ImageComparator {
        fn compare(&self, first: &[u8], second: &[u8]) -> Result<ImageSimilarity, VisualError> {
            let a = decode_gray(first)?;
            let mut b = decode_gray(second)?;

            let perceptual_distance = (phash(&a) ^ phash(&b)).count_ones();

            if a.dimensions() != b.dimensions() {
                b = imageops::resize(&b, a.width(), a.height(), FilterType::CatmullRom);
            }
            let similarity = mean_ssim(&a, &b)?;

            Ok(ImageSimilarity {
                perceptual_distance,
                similarity,
            })
        }
    }

    fn decode_gray(bytes: &[u8]) -> Result<GrayImage, VisualError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_luma8())
            .map_err(|e| VisualError::Decode(e.to_string()))
    }

    /// 64-bit DCT hash: 32x32 grayscale, 2-D DCT-II, top-left 8x8 block
    /// thresholded at its median.
    pub(super) fn phash(img: &GrayImage) -> u64 {
        let side = HASH_SIDE as u32;
        let small = imageops::resize(img, side, side, FilterType::Lanczos3);
        let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0])).collect();

        let cos_table: Vec<f64> = (0..HASH_SIDE * HASH_SIDE)
            .map(|i| {
                let (k, n) = (i / HASH_SIDE, i % HASH_SIDE);
                (std::f64::consts::PI * k as f64 * (2 * n + 1) as f64 / (2 * HASH_SIDE) as f64)
                    .cos()
            })
            .collect();

        // Columns first, then rows; only the low-frequency block is needed.
        let mut cols = vec![0.0f64; LOW_FREQ_SIDE * HASH_SIDE];
        for k in 0..LOW_FREQ_SIDE {
            for x in 0..HASH_SIDE {
                cols[k * HASH_SIDE + x] = (0..HASH_SIDE)
                    .map(|y| cos_table[k * HASH_SIDE + y] * pixels[y * HASH_SIDE + x])
                    .sum();
            }
        }
        let mut low = Vec::with_capacity(LOW_FREQ_SIDE * LOW_FREQ_SIDE);
        for ky in 0..LOW_FREQ_SIDE {
            for kx in 0..LOW_FREQ_SIDE {
                low.push(
                    (0..HASH_SIDE)
                        .map(|x| cos_table[kx * HASH_SIDE + x] * cols[ky * HASH_SIDE + x])
                        .sum::<f64>(),
                );
            }
        }

        let mut sorted = low.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

        low.iter()
            .enumerate()
            .filter(|(_, v)| **v > median)
            .fold(0u64, |bits, (i, _)| bits | (1u64 << i))
    }

    /// Summed-area table with a zero first row and column.
    struct Integral {
        stride: usize,
        sums: Vec<f64>,
    }

    impl Integral {
        fn build(width: usize, height: usize, value: impl Fn(usize, usize) -> f64) -> Self {
            let stride = width + 1;
            let mut sums = vec![0.0f64; stride * (height + 1)];
            for y in 0..height {
                let mut row = 0.0;
                for x in 0..width {
                    row += value(x, y);
                    sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
                }
            }
            Self { stride, sums }
        }

        fn window(&self, x: usize, y: usize, size: usize) -> f64 {
            let s = self.stride;
            self.sums[(y + size) * s + x + size] - self.sums[y * s + x + size]
                - self.sums[(y + size) * s + x]
                + self.sums[y * s + x]
        }
    }

    /// Mean SSIM over every fully contained 7x7 uniform window, using sample
    /// covariance. Both images must share dimensions.
    pub(super) fn mean_ssim(a: &GrayImage, b: &GrayImage) -> Result<f64, VisualError> {
        let (width, height) = (a.width() as usize, a.height() as usize);
        if width < SSIM_WINDOW || height < SSIM_WINDOW {
            return Err(VisualError::TooSmall {
                width: a.width(),
                height: a.height(),
                window: SSIM_WINDOW as u32,
            });
        }

        let pa = |x: usize, y: usize| f64::from(a.get_pixel(x as u32, y as u32).0[0]);
        let pb = |x: usize, y: usize| f64::from(b.get_pixel(x as u32, y as u32).0[0]);

        let sum_a = Integral::build(width, height, pa);
        let sum_b = Integral::build(width, height, pb);
        let sum_aa = Integral::build(width, height, |x, y| pa(x, y) * pa(x, y));
        let sum_bb = Integral::build(width, height, |x, y| pb(x, y) * pb(x, y));
        let sum_ab = Integral::build(width, height, |x, y| pa(x, y) * pb(x, y));

        let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
        let cov_norm = n / (n - 1.0);
        let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
        let c2 = (SSIM_K2 * DATA_RANGE).powi(2);

        let mut total = 0.0;
        let mut windows = 0usize;
        for y in 0..=height - SSIM_WINDOW {
            for x in 0..=width - SSIM_WINDOW {
                let ux = sum_a.window(x, y, SSIM_WINDOW) / n;
                let uy = sum_b.window(x, y, SSIM_WINDOW) / n;
                let uxx = sum_aa.window(x, y, SSIM_WINDOW) / n;
                let uyy = sum_bb.window(x, y, SSIM_WINDOW) / n;
                let uxy = sum_ab.window(x, y, SSIM_WINDOW) / n;

                let vx = cov_norm * (uxx - ux * ux);
                let vy = cov_norm * (uyy - uy * uy);
                let vxy = cov_norm * (uxy - ux * uy);

                let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                total += num / den;
                windows += 1;
            }
        }
        Ok(total / windows as f64)
    }
}

#[cfg(all(test, feature = "visual"))]
mod tests {
    use super::backend::{mean_ssim, phash};
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn wave(width: u32, height: u32, scale: f64) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let (fx, fy) = (f64::from(x) / scale, f64::from(y) / scale);
            let v = 128.0 + 100.0 * (fx / 9.0).sin() * (fy / 7.0).cos();
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    fn invert(img: &GrayImage) -> GrayImage {
        GrayImage::from_fn(img.width(), img.height(), |x, y| {
            Luma([255 - img.get_pixel(x, y).0[0]])
        })
    }

    fn png(img: &GrayImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img.clone())
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn identical_images_have_zero_distance_and_full_similarity() {
        let bytes = png(&wave(64, 48, 1.0));
        let result = ImageComparator.compare(&bytes, &bytes).unwrap();
        assert_eq!(result.perceptual_distance, 0);
        assert!((result.similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inverted_image_is_far_and_dissimilar() {
        let img = wave(64, 48, 1.0);
        let result = ImageComparator
            .compare(&png(&img), &png(&invert(&img)))
            .unwrap();
        assert!(result.perceptual_distance > 8, "{result:?}");
        assert!(result.similarity < 0.95, "{result:?}");
    }

    #[test]
    fn second_image_is_resized_to_the_first() {
        let small = wave(64, 48, 1.0);
        let large = wave(128, 96, 2.0);
        let result = ImageComparator.compare(&png(&small), &png(&large)).unwrap();
        assert!(result.similarity > 0.9, "{result:?}");
        assert!(result.perceptual_distance <= 10, "{result:?}");
    }

    #[test]
    fn tiny_images_cannot_be_scored() {
        let tiny = GrayImage::from_pixel(5, 5, Luma([10]));
        assert!(matches!(
            mean_ssim(&tiny, &tiny),
            Err(VisualError::TooSmall { width: 5, height: 5, .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = ImageComparator.compare(b"not an image", b"nope").unwrap_err();
        assert!(matches!(err, VisualError::Decode(_)));
    }

    #[test]
    fn phash_is_deterministic() {
        let img = wave(80, 60, 1.0);
        assert_eq!(phash(&img), phash(&img));
    }
}
