//! Error types for route table loading and request routing.

use std::path::PathBuf;
use thiserror::Error;

/// The route table source could not be read at all.
///
/// Fatal at startup. During a reload the previously installed table stays
/// in place.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read route table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read route table source: {0}")]
    Read(#[from] std::io::Error),

    #[error("route table is not a valid mapping document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("route table document must be a single mapping of route key to destination")]
    NotAMapping,
}

/// A single record of the route table that was skipped during loading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("line {line}: expected `key destination`, got {text:?}")]
    Malformed { line: usize, text: String },

    #[error("invalid route key {key:?}")]
    InvalidKey { key: String },

    #[error("entry {key:?}: destination must be a string")]
    NonStringDestination { key: String },

    #[error("mapping key {key:?} is not a string")]
    NonStringKey { key: String },

    #[error("route {key:?}: {source}")]
    Destination {
        key: String,
        #[source]
        source: DestinationParseError,
    },
}

/// A destination string that is not a usable absolute URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationParseError {
    #[error("{destination:?} is not a valid URL: {source}")]
    Invalid {
        destination: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{destination:?} uses unsupported scheme {scheme:?}")]
    UnsupportedScheme { destination: String, scheme: String },

    #[error("{destination:?} has no host")]
    MissingHost { destination: String },
}

/// Per-request routing outcome that prevents forwarding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route for key {key:?}")]
    RouteMiss { key: String },

    #[error("route {key:?} points at unusable destination {destination}")]
    MisconfiguredDestination { key: String, destination: String },
}
