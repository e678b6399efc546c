use std::{error::Error, fmt, io};

use model::ModelErr;

/// The flops counter's result type.
pub type Result<T> = std::result::Result<T, FlopsErr>;

/// Everything that can go wrong while profiling a network.
#[derive(Debug)]
pub enum FlopsErr {
    /// The requested counting backend does not exist.
    InvalidBackend(String),
    /// The arguments of a profiling call are unusable.
    InvalidInput(String),
    /// The network failed to trace.
    Model(ModelErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for FlopsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlopsErr::InvalidBackend(name) => write!(f, "wrong backend name: {name}"),
            FlopsErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            FlopsErr::Model(_) => write!(f, "the network failed to trace"),
            FlopsErr::Io(_) => write!(f, "io error"),
            FlopsErr::Json(_) => write!(f, "invalid JSON"),
        }
    }
}

impl Error for FlopsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FlopsErr::Model(e) => Some(e),
            FlopsErr::Io(e) => Some(e),
            FlopsErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelErr> for FlopsErr {
    fn from(value: ModelErr) -> Self {
        Self::Model(value)
    }
}

impl From<io::Error> for FlopsErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for FlopsErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_are_only_reported_as_sources() {
        let inner = ModelErr::DuplicateLayer("fc".into());
        let inner_msg = inner.to_string();
        let err = FlopsErr::from(inner);

        assert!(!err.to_string().contains(&inner_msg));
        assert_eq!(err.source().map(|e| e.to_string()), Some(inner_msg));
    }
}
