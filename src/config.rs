//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Environment variable consulted by [`Mode::from_env`].
pub const MODE_ENV_VAR: &str = "SIMPLUX_ENV";

/// How strictly usage errors are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Usage errors are returned to the caller.
    Development,
    /// Usage errors are logged and tolerated.
    Production,
}

impl Mode {
    /// Read the mode from `SIMPLUX_ENV`, falling back to the build profile.
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV_VAR) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::from_build(),
        }
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Mode::Production
        } else {
            Mode::Development
        }
    }

    fn from_build() -> Self {
        if cfg!(debug_assertions) {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    /// Install an in-memory store driven by the root reducer on creation.
    #[serde(default = "default_store")]
    pub default_store: bool,
}

fn default_store() -> bool {
    true
}

impl Config {
    pub fn development() -> Self {
        Self {
            mode: Mode::Development,
            default_store: true,
        }
    }

    pub fn production() -> Self {
        Self {
            mode: Mode::Production,
            default_store: true,
        }
    }

    /// Start the registry without any store installed.
    pub fn without_default_store(mut self) -> Self {
        self.default_store = false;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::from_env(),
            default_store: true,
        }
    }
}
