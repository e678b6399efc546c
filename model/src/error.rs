use std::{error::Error, fmt, io};

/// The result type used in the entire model crate.
pub type Result<T> = std::result::Result<T, ModelErr>;

/// The model crate's error type.
#[derive(Debug)]
pub enum ModelErr {
    /// A layer received an input whose shape it cannot consume.
    ShapeMismatch {
        layer: String,
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The input has fewer axes than the layer needs.
    RankMismatch {
        layer: String,
        got: usize,
        expected: usize,
    },
    /// The output of a layer would have a zero or negative extent.
    EmptyOutput { layer: String },
    /// Two branches of a merge produced incompatible shapes.
    MergeMismatch { left: Vec<usize>, right: Vec<usize> },
    /// A node referenced a layer that is not registered.
    UnknownLayer(String),
    /// Two layers were registered under the same path.
    DuplicateLayer(String),
    /// The network or one of its layers is misconfigured.
    InvalidConfig(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl ModelErr {
    /// Names the offending layer by its path in the network.
    pub(crate) fn at(self, path: &str) -> Self {
        let locate = |layer: String| format!("{path} ({layer})");
        match self {
            ModelErr::ShapeMismatch {
                layer,
                what,
                got,
                expected,
            } => ModelErr::ShapeMismatch {
                layer: locate(layer),
                what,
                got,
                expected,
            },
            ModelErr::RankMismatch {
                layer,
                got,
                expected,
            } => ModelErr::RankMismatch {
                layer: locate(layer),
                got,
                expected,
            },
            ModelErr::EmptyOutput { layer } => ModelErr::EmptyOutput {
                layer: locate(layer),
            },
            ModelErr::InvalidConfig(msg) => ModelErr::InvalidConfig(format!("{path}: {msg}")),
            other => other,
        }
    }
}

impl fmt::Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelErr::ShapeMismatch {
                layer,
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch at {layer}: {what} is {got}, expected {expected}"
            ),
            ModelErr::RankMismatch {
                layer,
                got,
                expected,
            } => write!(
                f,
                "rank mismatch at {layer}: input has {got} axes, expected {expected}"
            ),
            ModelErr::EmptyOutput { layer } => {
                write!(f, "the output of {layer} would be empty")
            }
            ModelErr::MergeMismatch { left, right } => {
                write!(f, "cannot merge shapes {left:?} and {right:?}")
            }
            ModelErr::UnknownLayer(path) => write!(f, "unknown layer: {path}"),
            ModelErr::DuplicateLayer(path) => write!(f, "layer registered twice: {path}"),
            ModelErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            ModelErr::Io(_) => write!(f, "io error"),
            ModelErr::Json(_) => write!(f, "invalid JSON"),
        }
    }
}

impl Error for ModelErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ModelErr::Io(e) => Some(e),
            ModelErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ModelErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ModelErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
