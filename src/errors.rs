//! Errors produced by zharness.
//!
//! The aggregator never errors on stream content; these cover the emitter
//! contract, configuration and discovery.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A violation of the emitter-side contract, or a failed write.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("result `{label}` emitted before any group header")]
    NoGroup { label: String },

    #[error("group `{group}` declared {declared} tests, result `{label}` would be #{ordinal}")]
    TooManyResults {
        group: String,
        declared: u32,
        ordinal: u32,
        label: String,
    },

    #[error("group `{group}` has {count} tests, more than a header can declare")]
    GroupTooLarge { group: String, count: usize },

    #[error("context lines must directly follow a failing result")]
    DetachedContext,

    #[error("error writing protocol output")]
    Io(#[from] io::Error),
}

/// An error that occurred while loading `zharness.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error("failed to parse config at `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: toml::de::Error,
    },

    #[error("runner command for `{kind}` is empty")]
    EmptyRunner { kind: String },
}

/// An error that prevented ZFile discovery from running at all.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid Z_SKIP_PATH pattern `{pattern}`")]
    SkipPattern {
        pattern: String,
        #[source]
        err: regex::Error,
    },

    #[error("error walking `{}`", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        err: walkdir::Error,
    },

    #[error("error reading `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}
