use crate::error::ShapeError;
use crate::params::INPUT_SIZE;
use image::{
    DynamicImage, GrayImage, Luma,
    imageops::{self, FilterType},
};
use ndarray::{Array1, Array2};

// Side length of the square images the network was trained on.
pub const IMAGE_SIDE: u32 = 28;

// Turns a captured bitmap into the network's input vector.
//
// The bitmap is scaled with a bilinear filter to fit inside a 28 x 28 box, keeping its aspect
// ratio, and converted to 8-bit grayscale. A bitmap that does not end up exactly 28 x 28 is
// centered on a white canvas, so the padding reads as background. The pixels are then flattened
// row by row, inverted (the canvas draws dark ink on white, while the training data has bright ink
// on black), and scaled into `[0.0, 1.0]`.
pub fn preprocess(image: &DynamicImage) -> Result<Array1<f32>, ShapeError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ShapeError::EmptyImage { width, height });
    }

    let fitted = image
        .resize(IMAGE_SIDE, IMAGE_SIDE, FilterType::Triangle)
        .to_luma8();

    let mut canvas = GrayImage::from_pixel(IMAGE_SIDE, IMAGE_SIDE, Luma([u8::MAX]));
    let x = (IMAGE_SIDE - fitted.width()) / 2;
    let y = (IMAGE_SIDE - fitted.height()) / 2;
    imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));

    let features = canvas
        .pixels()
        .map(|&Luma([value])| f32::from(u8::MAX - value) / 255.0)
        .collect::<Array1<_>>();
    debug_assert_eq!(features.len(), INPUT_SIZE);
    Ok(features)
}

// Preprocesses several bitmaps into an `[N x 784]` batch, one row per bitmap.
pub fn preprocess_batch(images: &[DynamicImage]) -> Result<Array2<f32>, ShapeError> {
    let mut batch = Array2::zeros((images.len(), INPUT_SIZE));
    for (mut row, image) in batch.rows_mut().into_iter().zip(images) {
        row.assign(&preprocess(image)?);
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn filled(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])))
    }

    #[test]
    fn white_canvas_is_all_background() {
        for side in [IMAGE_SIDE, 112, 280] {
            let features = preprocess(&filled(side, side, 255)).unwrap();
            assert_eq!(features.len(), INPUT_SIZE);
            assert!(features.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn black_canvas_is_all_ink() {
        for side in [IMAGE_SIDE, 112, 280] {
            let features = preprocess(&filled(side, side, 0)).unwrap();
            assert_eq!(features.len(), INPUT_SIZE);
            assert!(features.iter().all(|&x| x == 1.0));
        }
    }

    #[test]
    fn gray_levels_are_inverted_and_scaled() {
        let features = preprocess(&filled(IMAGE_SIDE, IMAGE_SIDE, 204)).unwrap();
        assert!(features.iter().all(|&x| (x - 0.2).abs() < 1e-6));
    }

    #[test]
    fn rows_are_flattened_in_order() {
        let mut image = GrayImage::from_pixel(IMAGE_SIDE, IMAGE_SIDE, Luma([255]));
        image.put_pixel(5, 3, Luma([0]));
        let features = preprocess(&DynamicImage::ImageLuma8(image)).unwrap();

        assert_eq!(features[3 * IMAGE_SIDE as usize + 5], 1.0);
        assert_eq!(features.sum(), 1.0);
    }

    #[test]
    fn wide_images_are_letterboxed() {
        // A 2:1 black image fits as 28 x 14, centered with 7 rows of padding above and below.
        let features = preprocess(&filled(56, 28, 0)).unwrap();
        let side = IMAGE_SIDE as usize;

        for (row, pixels) in features.exact_chunks(side).into_iter().enumerate() {
            let expected = if (7..21).contains(&row) { 1.0 } else { 0.0 };
            assert!(pixels.iter().all(|&x| x == expected), "row {row}");
        }
    }

    #[test]
    fn empty_images_are_rejected() {
        assert_eq!(
            preprocess(&filled(0, 10, 255)).unwrap_err(),
            ShapeError::EmptyImage {
                width: 0,
                height: 10
            }
        );
    }

    #[test]
    fn batch_stacks_rows() {
        let batch = preprocess_batch(&[filled(40, 40, 255), filled(40, 40, 0)]).unwrap();
        assert_eq!(batch.dim(), (2, INPUT_SIZE));
        assert_eq!(batch.row(0).sum(), 0.0);
        assert_eq!(batch.row(1).sum(), INPUT_SIZE as f32);
    }
}
