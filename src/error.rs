use std::path::PathBuf;
use thiserror::Error;

// Raised while reading the parameter files at startup. Any of these leaves the recognizer unusable,
// so they are reported once and never retried.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed array file {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
    #[error("Parameter {name} has shape [{found}], expected [{expected}]")]
    Shape {
        name: &'static str,
        expected: String,
        found: String,
    },
}

// Raised per request when the input cannot be fed to the network. The parameter set is untouched,
// so the caller can simply retry with corrected input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Input has {found} features per row, expected {expected}")]
    FeatureWidth { expected: usize, found: usize },
    #[error("Cannot preprocess an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
}
