use thiserror::Error;

/// Errors raised while loading the static configuration.
///
/// All of them are fatal: the engine never starts networking with a
/// configuration it could not fully read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing configuration key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid peer line {line}: {content:?}")]
    InvalidPeerLine { line: usize, content: String },

    #[error("duplicate peer id in roster: {0}")]
    DuplicatePeer(u32),

    #[error("roster is empty")]
    EmptyRoster,

    #[error("peer {0} is not in the roster")]
    UnknownLocalPeer(u32),
}
