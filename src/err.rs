use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystrayError {
    #[error("tray is already registered")]
    AlreadyRegistered,
    #[error("tray has no registered hooks, call register first")]
    NotRegistered,
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid tray config: {0}")]
    Config(#[from] config::ConfigError),
    #[error("separator under {0:?}, separators are only allowed at the top level")]
    NestedSeparator(String),
    #[error("menu has no item with key {0:?}")]
    MissingItem(String),
    #[error("{0}")]
    Path(&'static str),
    #[error("invalid icon: {0}")]
    Icon(String),
    #[error("native event loop failed: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, SystrayError>;
