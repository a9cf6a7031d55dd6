use crate::error::LoadError;
use flate2::read::GzDecoder;
use itertools::Itertools;
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2, IxDyn, ShapeBuilder};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

// Number of input neurons: one per pixel of a 28 x 28 image.
pub const INPUT_SIZE: usize = 28 * 28;
// Number of output neurons: one per digit.
pub const CLASSES: usize = 10;
pub const DEFAULT_PARAMS_DIR: &str = "./params";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

// Locations of the four parameter arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamPaths {
    pub w1: PathBuf,
    pub b1: PathBuf,
    pub w2: PathBuf,
    pub b2: PathBuf,
}

impl ParamPaths {
    // Resolves `w1`, `b1`, `w2` and `b2` inside `dir`. Each name maps to `<name>.npy`, or to
    // `<name>.npy.gz` when only the compressed file is present.
    pub fn in_dir(dir: impl AsRef<Path>) -> ParamPaths {
        let dir = dir.as_ref();
        let resolve = |name: &str| {
            let plain = dir.join(format!("{name}.npy"));
            let compressed = dir.join(format!("{name}.npy.gz"));
            if !plain.exists() && compressed.exists() {
                compressed
            } else {
                plain
            }
        };

        ParamPaths {
            w1: resolve("w1"),
            b1: resolve("b1"),
            w2: resolve("w2"),
            b2: resolve("b2"),
        }
    }
}

impl Default for ParamPaths {
    fn default() -> Self {
        ParamPaths::in_dir(DEFAULT_PARAMS_DIR)
    }
}

// The weights and biases of the two-layer network. Shapes are checked once on construction and
// the arrays are never mutated afterwards, so a set can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
}

impl ParameterSet {
    // Builds a parameter set from in-memory arrays, rejecting any combination whose inner
    // dimensions do not line up.
    pub fn new(
        w1: Array2<f32>,
        b1: Array1<f32>,
        w2: Array2<f32>,
        b2: Array1<f32>,
    ) -> Result<ParameterSet, LoadError> {
        let hidden = w1.ncols();

        // The hidden width is whatever the first weight matrix says it is. Everything else is
        // checked against it and against the fixed input and output sizes.
        if w1.nrows() != INPUT_SIZE {
            return Err(shape_error("w1", format!("{INPUT_SIZE}, H"), w1.shape()));
        }
        if b1.len() != hidden {
            return Err(shape_error("b1", hidden.to_string(), b1.shape()));
        }
        if w2.nrows() != hidden || w2.ncols() != CLASSES {
            return Err(shape_error("w2", format!("{hidden}, {CLASSES}"), w2.shape()));
        }
        if b2.len() != CLASSES {
            return Err(shape_error("b2", CLASSES.to_string(), b2.shape()));
        }

        Ok(ParameterSet { w1, b1, w2, b2 })
    }

    // Reads and validates the four arrays. Failure here is fatal for the recognizer.
    pub fn load(paths: &ParamPaths) -> Result<ParameterSet, LoadError> {
        let w1 = into_weights("w1", read_array(&paths.w1)?)?;
        let b1 = into_bias("b1", read_array(&paths.b1)?)?;
        let w2 = into_weights("w2", read_array(&paths.w2)?)?;
        let b2 = into_bias("b2", read_array(&paths.b2)?)?;

        let parameters = ParameterSet::new(w1, b1, w2, b2)?;
        info!(
            "Loaded network parameters from {} ({INPUT_SIZE} -> {} -> {CLASSES})",
            paths.w1.parent().unwrap_or(Path::new(".")).display(),
            parameters.hidden_width()
        );
        Ok(parameters)
    }

    pub fn hidden_width(&self) -> usize {
        self.w1.ncols()
    }

    pub fn w1(&self) -> &Array2<f32> {
        &self.w1
    }

    pub fn b1(&self) -> &Array1<f32> {
        &self.b1
    }

    pub fn w2(&self) -> &Array2<f32> {
        &self.w2
    }

    pub fn b2(&self) -> &Array1<f32> {
        &self.b2
    }
}

fn shape_error(name: &'static str, expected: String, found: &[usize]) -> LoadError {
    LoadError::Shape {
        name,
        expected,
        found: found.iter().join(", "),
    }
}

fn into_weights(name: &'static str, array: ArrayD<f32>) -> Result<Array2<f32>, LoadError> {
    let found = array.shape().to_vec();
    array
        .into_dimensionality::<Ix2>()
        .map_err(|_| shape_error(name, "rows, columns".to_string(), &found))
}

// Biases are accepted both as plain vectors and as single-row matrices, which is what a bias
// broadcast over a batch often ends up saved as.
fn into_bias(name: &'static str, array: ArrayD<f32>) -> Result<Array1<f32>, LoadError> {
    let found = array.shape().to_vec();
    let array = match found.as_slice() {
        [1, _] => array.index_axis_move(Axis(0), 0),
        _ => array,
    };
    array
        .into_dimensionality::<Ix1>()
        .map_err(|_| shape_error(name, "length".to_string(), &found))
}

// Read the whole file into memory, gunzipping it first if its name ends in ".gz".
fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    let io_error = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let mut bytes = Vec::new();
    let read = if path.extension().is_some_and(|extension| extension == "gz") {
        GzDecoder::new(file).read_to_end(&mut bytes)
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes)
    };
    read.map_err(io_error)?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

fn read_array(path: &Path) -> Result<ArrayD<f32>, LoadError> {
    let bytes = read_bytes(path)?;
    parse_npy(&bytes).map_err(|reason| LoadError::Format {
        path: path.to_path_buf(),
        reason,
    })
}

struct NpyHeader {
    big_endian: bool,
    fortran_order: bool,
    shape: Vec<usize>,
}

// Decode an array stored in the NumPy ".npy" format. The file starts with a magic string, a
// two-byte version, and the length of a text header (two bytes in version 1, four bytes in versions
// 2 and 3). The header is a Python dict literal describing the element type, the memory order and
// the shape. The raw element data follows it directly.
fn parse_npy(bytes: &[u8]) -> Result<ArrayD<f32>, String> {
    let rest = bytes
        .strip_prefix(NPY_MAGIC)
        .ok_or("missing NPY magic string")?;
    let (&[major, _minor], rest) = rest
        .split_first_chunk::<2>()
        .ok_or("truncated format version")?;

    let (header_len, rest) = match major {
        1 => {
            let (len, rest) = rest
                .split_first_chunk::<2>()
                .ok_or("truncated header length")?;
            (usize::from(u16::from_le_bytes(*len)), rest)
        }
        2 | 3 => {
            let (len, rest) = rest
                .split_first_chunk::<4>()
                .ok_or("truncated header length")?;
            (u32::from_le_bytes(*len) as usize, rest)
        }
        other => return Err(format!("unsupported format version {other}")),
    };

    if rest.len() < header_len {
        return Err(format!(
            "header claims {header_len} bytes but only {} remain",
            rest.len()
        ));
    }
    let (header, data) = rest.split_at(header_len);
    let header = std::str::from_utf8(header).map_err(|_| "header is not valid text")?;
    let header = parse_header(header)?;

    // The dimensions come straight from the file, so a corrupt header must not be allowed to
    // overflow the byte count.
    let data_len = header
        .shape
        .iter()
        .try_fold(1usize, |elements, &dimension| elements.checked_mul(dimension))
        .and_then(|elements| elements.checked_mul(size_of::<f32>()))
        .ok_or_else(|| format!("shape ({}) overflows", header.shape.iter().join(", ")))?;
    if data.len() != data_len {
        return Err(format!(
            "shape ({}) needs {data_len} bytes of data, found {}",
            header.shape.iter().join(", "),
            data.len()
        ));
    }

    let values = data
        .chunks_exact(size_of::<f32>())
        .map(|chunk| {
            let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
            if header.big_endian {
                f32::from_be_bytes(bytes)
            } else {
                f32::from_le_bytes(bytes)
            }
        })
        .collect::<Vec<_>>();

    ArrayD::from_shape_vec(
        IxDyn(&header.shape).set_f(header.fortran_order),
        values,
    )
    .map_err(|err| err.to_string())
}

// The header looks like: {'descr': '<f4', 'fortran_order': False, 'shape': (784, 100), }
fn parse_header(header: &str) -> Result<NpyHeader, String> {
    let big_endian = match dict_value(header, "descr")?.trim_matches(['\'', '"']) {
        "<f4" => false,
        ">f4" => true,
        other => {
            return Err(format!(
                "unsupported element type '{other}', expected 32-bit floats \
                 (convert the array with astype(np.float32) before saving)"
            ));
        }
    };

    let fortran_order = match dict_value(header, "fortran_order")? {
        "True" => true,
        "False" => false,
        other => return Err(format!("invalid fortran_order value '{other}'")),
    };

    // A one-dimensional shape is written with a trailing comma, e.g. "(10,)".
    let shape = dict_value(header, "shape")?;
    let shape = shape
        .strip_prefix('(')
        .and_then(|shape| shape.strip_suffix(')'))
        .ok_or_else(|| format!("invalid shape '{shape}'"))?
        .split(',')
        .map(str::trim)
        .filter(|dimension| !dimension.is_empty())
        .map(|dimension| {
            dimension
                .parse::<usize>()
                .map_err(|_| format!("invalid dimension '{dimension}' in shape"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NpyHeader {
        big_endian,
        fortran_order,
        shape,
    })
}

// Return the source text of the value stored under `key` in the header's dict literal.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str, String> {
    let quoted_key = format!("'{key}':");
    let start = header
        .find(&quoted_key)
        .ok_or_else(|| format!("header has no '{key}' entry"))?;
    let value = header[start + quoted_key.len()..].trim_start();

    let end = if value.starts_with('(') {
        value.find(')').map(|index| index + 1)
    } else {
        value.find([',', '}'])
    }
    .ok_or_else(|| format!("unterminated '{key}' entry"))?;

    Ok(value[..end].trim())
}
