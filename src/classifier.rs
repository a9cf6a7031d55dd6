use crate::error::{LoadError, ShapeError};
use crate::network::Network;
use crate::params::ParamPaths;
use crate::preprocess::{preprocess, preprocess_batch};
use image::DynamicImage;
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

// The outcome of recognizing one bitmap: the chosen digit and the full output distribution.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub label: usize,
    pub probabilities: Array1<f32>,
}

impl Recognition {
    // Probability the network assigned to the chosen label.
    pub fn confidence(&self) -> f32 {
        self.probabilities[self.label]
    }
}

// Index of the largest entry. Exact ties go to the lowest index.
//
// Only a strictly greater value replaces the running maximum, and every comparison with NaN is
// false, so NaN entries are never chosen. A row that is entirely NaN yields 0.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.indexed_iter()
        .fold((0, f32::NEG_INFINITY), |(best, max), (index, &value)| {
            if value > max {
                (index, value)
            } else {
                (best, max)
            }
        })
        .0
}

// Applies argmax to every row of an `[N x C]` probability matrix.
pub fn predict(probabilities: ArrayView2<f32>) -> Array1<usize> {
    probabilities.rows().into_iter().map(argmax).collect()
}

// Bitmap in, digit out: preprocessing, the forward pass and the decision rule in one place.
#[derive(Debug, Clone)]
pub struct Classifier {
    network: Network,
}

impl Classifier {
    pub fn new(network: Network) -> Classifier {
        Classifier { network }
    }

    pub fn load(paths: &ParamPaths) -> Result<Classifier, LoadError> {
        Network::load(paths).map(Classifier::new)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<usize, ShapeError> {
        self.recognize(image).map(|recognition| recognition.label)
    }

    pub fn recognize(&self, image: &DynamicImage) -> Result<Recognition, ShapeError> {
        let features = preprocess(image)?;
        self.recognize_features(features.view())
    }

    // Runs the forward pass and decision rule on a feature vector that has already been
    // preprocessed, for callers that also want to look at the features themselves.
    pub fn recognize_features(&self, features: ArrayView1<f32>) -> Result<Recognition, ShapeError> {
        let activations = self.network.forward_one(features)?;
        let probabilities = activations.probabilities.index_axis_move(Axis(0), 0);
        let label = argmax(probabilities.view());

        debug!("Recognized digit {label} (p = {:.3})", probabilities[label]);
        Ok(Recognition {
            label,
            probabilities,
        })
    }

    pub fn classify_batch(&self, images: &[DynamicImage]) -> Result<Array1<usize>, ShapeError> {
        let features = preprocess_batch(images)?;
        let activations = self.network.forward(features.view())?;
        Ok(predict(activations.probabilities.view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CLASSES, INPUT_SIZE, ParameterSet};
    use crate::preprocess::IMAGE_SIDE;
    use image::{GrayImage, Luma};
    use ndarray::{Array2, array, s};

    // Hidden neuron k sums the ink in pixel row 2k + 4 and feeds it straight to output k, so the
    // digit predicted is decided by which of those rows is drawn on.
    fn row_detector() -> Classifier {
        let side = IMAGE_SIDE as usize;
        let mut w1 = Array2::zeros((INPUT_SIZE, CLASSES));
        for k in 0..CLASSES {
            let row = 2 * k + 4;
            w1.slice_mut(s![row * side..(row + 1) * side, k]).fill(1.0);
        }
        let parameters = ParameterSet::new(
            w1,
            Array1::zeros(CLASSES),
            Array2::eye(CLASSES),
            Array1::zeros(CLASSES),
        )
        .unwrap();
        Classifier::new(Network::new(parameters))
    }

    fn stroke_on_row(row: u32) -> DynamicImage {
        let mut image = GrayImage::from_pixel(IMAGE_SIDE, IMAGE_SIDE, Luma([255]));
        for x in 0..IMAGE_SIDE {
            image.put_pixel(x, row, Luma([0]));
        }
        DynamicImage::ImageLuma8(image)
    }

    #[test]
    fn predicts_strict_maximum() {
        let probabilities = array![[0.1f32, 0.1, 0.8, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        assert_eq!(predict(probabilities.view()), array![2usize]);
    }

    #[test]
    fn ties_go_to_lowest_index() {
        let probabilities = array![
            [0.5f32, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.25, 0.0, 0.25, 0.0, 0.25, 0.0, 0.25],
        ];
        assert_eq!(predict(probabilities.view()), array![0usize, 3]);
    }

    #[test]
    fn nan_entries_are_never_chosen() {
        assert_eq!(argmax(array![f32::NAN, 0.2, 0.7, f32::NAN].view()), 2);
        assert_eq!(argmax(Array1::from_elem(CLASSES, f32::NAN).view()), 0);
    }

    #[test]
    fn classifies_engineered_seven() {
        let classifier = row_detector();
        let recognition = classifier.recognize(&stroke_on_row(18)).unwrap();

        assert_eq!(recognition.label, 7);
        assert_eq!(recognition.probabilities.len(), CLASSES);
        assert!(recognition.confidence() > 0.99);
        assert_eq!(classifier.classify(&stroke_on_row(18)).unwrap(), 7);
    }

    #[test]
    fn recognizes_preprocessed_features() {
        let classifier = row_detector();
        let image = stroke_on_row(18);
        let features = preprocess(&image).unwrap();

        let from_features = classifier.recognize_features(features.view()).unwrap();
        let from_image = classifier.recognize(&image).unwrap();
        assert_eq!(from_features.label, 7);
        assert_eq!(from_features.probabilities, from_image.probabilities);

        assert_eq!(
            classifier
                .recognize_features(Array1::zeros(INPUT_SIZE - 1).view())
                .unwrap_err(),
            ShapeError::FeatureWidth {
                expected: INPUT_SIZE,
                found: INPUT_SIZE - 1
            }
        );
    }

    #[test]
    fn undetected_stroke_falls_back_to_first_class() {
        // Every logit is zero, so the distribution is uniform and the tie goes to class 0.
        let recognition = row_detector().recognize(&stroke_on_row(0)).unwrap();
        assert_eq!(recognition.label, 0);
        assert!((recognition.confidence() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn classifies_a_batch() {
        let images = [stroke_on_row(4), stroke_on_row(22), stroke_on_row(12)];
        assert_eq!(
            row_detector().classify_batch(&images).unwrap(),
            array![0usize, 9, 4]
        );
    }
}
