use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CLIENT_ID_VAR: &str = "SPOTIPY_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SPOTIPY_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "SPOTIPY_REDIRECT_URI";
pub const CACHE_PATH_VAR: &str = "SPOTIPY_CACHE_PATH";

/// playlist of silent tracks kept playing while waiting for the alarm
pub const DEFAULT_SILENCE_CONTEXT: &str =
    "https://open.spotify.com/playlist/4JZXHm8EZqC8Nq4hD28WRu?si=487697d5970e41fd";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_silence_context")]
    pub silence_context: String,
    #[serde(default = "default_volume")]
    pub default_volume: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            cache_path: default_cache_path(),
            silence_context: default_silence_context(),
            default_volume: default_volume(),
        }
    }
}

fn default_redirect_uri() -> String {
    "http://localhost".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".spotify_cache")
}

fn default_silence_context() -> String {
    DEFAULT_SILENCE_CONTEXT.to_string()
}

const fn default_volume() -> i32 {
    80
}

/// what the Spotify client needs to authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// loads the config file at `path`, falling back to defaults if it doesn't exist
    ///
    /// # Errors
    /// if the file exists but can't be read or isn't valid TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&config).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    /// if the config can't be serialized or written to `path`
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, config).map_err(write_err)
    }

    /// overrides file values with whatever `lookup` finds for the `SPOTIPY_*` variables
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(client_id) = get(CLIENT_ID_VAR) {
            self.client_id = Some(client_id);
        }
        if let Some(client_secret) = get(CLIENT_SECRET_VAR) {
            self.client_secret = Some(client_secret);
        }
        if let Some(redirect_uri) = get(REDIRECT_URI_VAR) {
            self.redirect_uri = redirect_uri;
        }
        if let Some(cache_path) = get(CACHE_PATH_VAR) {
            self.cache_path = PathBuf::from(cache_path);
        }
        self
    }

    /// # Errors
    /// [`ConfigError::MissingCredential`] naming the first missing variable
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            client_id: self
                .client_id
                .clone()
                .ok_or(ConfigError::MissingCredential(CLIENT_ID_VAR))?,
            client_secret: self
                .client_secret
                .clone()
                .ok_or(ConfigError::MissingCredential(CLIENT_SECRET_VAR))?,
            redirect_uri: self.redirect_uri.clone(),
        })
    }

    /// # Errors
    /// if the platform has no config directory
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = directories::ProjectDirs::from("", "", "spotify_alarm")
            .ok_or(ConfigError::NoConfigDir)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }
}
