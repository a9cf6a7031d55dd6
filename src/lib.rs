// Handwritten digit recognition with a small two-layer network. A captured bitmap goes through
// preprocessing, the network's forward pass and the argmax decision rule; Classifier wires the
// three together.

pub mod classifier;
pub mod error;
pub mod network;
pub mod params;
pub mod preprocess;
pub mod visualize;

pub use classifier::{Classifier, Recognition, argmax, predict};
pub use error::{LoadError, ShapeError};
pub use network::{Activations, Network, relu, softmax};
pub use params::{CLASSES, DEFAULT_PARAMS_DIR, INPUT_SIZE, ParamPaths, ParameterSet};
pub use preprocess::{IMAGE_SIDE, preprocess, preprocess_batch};
pub use visualize::render_ascii;
