//! Error types for the alarm and its Spotify client

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that end an alarm run
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("incorrect time format {input:?}, should be HH:MM")]
    InvalidTimeFormat { input: String },

    #[error("no active Spotify device found")]
    NoDeviceAvailable,

    #[error("couldn't {action}")]
    CollaboratorRequestFailed {
        action: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("couldn't read device choice")]
    Prompt(#[source] io::Error),
}

/// Errors from the Spotify Web API and its authorization flow
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("spotify answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("couldn't reach spotify: {0}")]
    Transport(String),

    #[error("couldn't decode spotify response")]
    Decode(#[source] io::Error),

    #[error("spotify authorization failed: {0}")]
    Authorization(String),

    #[error("failed to access token cache {path}")]
    TokenCache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => Self::Status {
                status,
                message: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => Self::Transport(transport.to_string()),
        }
    }
}

/// Errors while loading or writing the config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config TOML in {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write config file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't serialize config")]
    Serialize(#[from] toml::ser::Error),

    #[error("couldn't determine the config directory")]
    NoConfigDir,

    #[error("missing {0}; set it in the environment or the config file")]
    MissingCredential(&'static str),
}
