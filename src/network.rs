use crate::error::{LoadError, ShapeError};
use crate::params::{INPUT_SIZE, ParamPaths, ParameterSet};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

// The activations of every layer after the input layer. Each row corresponds to one row of the
// input batch.
#[derive(Debug, Clone)]
pub struct Activations {
    pub hidden: Array2<f32>,
    pub probabilities: Array2<f32>,
}

// A fully-connected network with one ReLU hidden layer and a softmax output layer. The network only
// ever reads its parameters, so a single instance can serve any number of threads at once.
#[derive(Debug, Clone)]
pub struct Network {
    parameters: ParameterSet,
}

impl Network {
    pub fn new(parameters: ParameterSet) -> Network {
        Network { parameters }
    }

    pub fn load(paths: &ParamPaths) -> Result<Network, LoadError> {
        ParameterSet::load(paths).map(Network::new)
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    // Calculates the activations of the hidden and output layers for a batch of inputs. The input
    // must be an [N x 784] array, one flattened image per row; any other width is rejected rather
    // than broadcast. NaN or infinite inputs are not checked for and simply flow through into the
    // output, so callers should not pass them.
    pub fn forward(&self, input: ArrayView2<f32>) -> Result<Activations, ShapeError> {
        if input.ncols() != INPUT_SIZE {
            return Err(ShapeError::FeatureWidth {
                expected: INPUT_SIZE,
                found: input.ncols(),
            });
        }

        // Compute the hidden layer with h = ReLU(x.w1 + b1). The bias vector is broadcast over
        // every row of the batch.
        let mut hidden = input.dot(self.parameters.w1()) + self.parameters.b1();
        hidden.mapv_inplace(relu);

        // Then the output layer with p = softmax(h.w2 + b2).
        let logits = hidden.dot(self.parameters.w2()) + self.parameters.b2();
        let probabilities = softmax(logits);

        Ok(Activations {
            hidden,
            probabilities,
        })
    }

    // Convenience for a single [784] feature vector. The returned activations still have one row.
    pub fn forward_one(&self, input: ArrayView1<f32>) -> Result<Activations, ShapeError> {
        self.forward(input.insert_axis(Axis(0)))
    }
}

// Exactly max(z, 0). A NaN is not less than zero, so it passes through unchanged.
pub fn relu(z: f32) -> f32 {
    if z < 0.0 { 0.0 } else { z }
}

// Turns each row of logits into a probability distribution. The row maximum is subtracted before
// exponentiating so that large logits cannot overflow; this does not change the result. f32::max
// ignores NaN, so a NaN logit still reaches the exponentials and turns the whole row into NaN.
pub fn softmax(mut logits: Array2<f32>) -> Array2<f32> {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |max, &z| max.max(z));
        row.mapv_inplace(|z| (z - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|e| e / sum);
    }
    logits
}
