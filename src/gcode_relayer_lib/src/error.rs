use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{LayerNumber, Mm};

// Non-positive per-layer heights and malformed Z tokens are recovered where they happen.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no '; (--- Layer N ...' comments found, can't determine the layer count")]
    NoLayers,

    #[error("layer marker claims {0} layers, more than can be planned")]
    TooManyLayers(LayerNumber),

    #[error("invalid layer height rule: {0}")]
    InvalidRule(String),

    // Recoverable by the caller by supplying an original height explicitly.
    #[error("could not determine a positive original layer height (looked for the layer height comment, the first G1 Z in layer 1, and the first non-zero Z)")]
    OriginalHeightUnknown,

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn invalid_height(what: &str, value: Mm) -> Error {
        Error::InvalidRule(format!("{} must be a positive number, got {}", what, value))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
