//! Configuration of a benchmark run.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `BLOBBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `BLOBBENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `BLOBBENCH__ACCOUNT_NAME=myaccount` sets the storage account
//! - `BLOBBENCH__NUM_FILES=100` sets the number of files to upload
//! - `BLOBBENCH__LOGGING__LEVEL=debug` sets the log level
//!
//! # YAML Configuration File
//!
//! ```yaml
//! account_name: myaccount
//! container_name: benchmarks
//! num_files: 100
//! block_size: 8 MiB
//!
//! logging:
//!   format: json
//! ```

use std::fmt;
use std::path::Path;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::job::DEFAULT_PREFIX;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "BLOBBENCH__";

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Chooses [`LogFormat::Pretty`] if stderr is a TTY, otherwise [`LogFormat::Simplified`].
    Auto,
    /// Multi-line output with colors.
    Pretty,
    /// Single-line plain text output.
    Simplified,
    /// JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr, the report goes to stdout.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    ///
    /// Defaults to `INFO`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. Defaults to [`LogFormat::Auto`].
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Errors detected when validating a [`Config`].
///
/// Options are named by their command line flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required option `--{0}`")]
    Missing(&'static str),
    #[error("option `--{0}` must be at least 1")]
    Zero(&'static str),
    #[error("option `block_size` must be between 1 B and {max}, got {0}", max = MAX_BLOCK_SIZE)]
    BlockSize(ByteSize),
}

/// The largest block the Blob service accepts in a single `Put Block` request.
pub const MAX_BLOCK_SIZE: ByteSize = ByteSize::mib(4000);

/// Configuration of a benchmark run.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Azure Storage account name. Required.
    pub account_name: String,

    /// Base64-encoded Azure Storage account key. Required.
    pub account_key: Option<SecretBox<ConfigSecret>>,

    /// Container that objects are written to. Required.
    pub container_name: String,

    /// Overrides the Blob service endpoint, for example to target the storage emulator.
    ///
    /// Defaults to `https://{account_name}.blob.core.windows.net/`.
    pub endpoint: Option<String>,

    /// Number of objects to upload. Defaults to `1000`.
    pub num_files: u64,

    /// Size of every object in MB (MiB). Defaults to `64`.
    pub file_size: u64,

    /// Number of concurrent workers. Defaults to `8`.
    pub workers: usize,

    /// Number of blocks each single upload keeps in flight. Defaults to `16`.
    pub concurrency: usize,

    /// Size of the blocks that uploads are split into. Defaults to `4 MiB`.
    pub block_size: ByteSize,

    /// Prefix of object names, which are `{prefix}_{i}.bin`. Defaults to `file`.
    pub prefix: String,

    /// Create the container before uploading. An existing container is not an error.
    pub create_container: bool,

    /// Download and verify every object after the upload phase.
    pub download: bool,

    /// Delete every object at the end of the run.
    pub cleanup: bool,

    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_name: String::new(),
            account_key: None,
            container_name: String::new(),
            endpoint: None,

            num_files: 1000,
            file_size: 64,
            workers: 8,
            concurrency: 16,
            block_size: ByteSize::mib(4),
            prefix: DEFAULT_PREFIX.to_owned(),

            create_container: false,
            download: false,
            cleanup: false,

            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration, merging the optional YAML file, the environment, and `overrides`.
    ///
    /// `overrides` is typically built from command line flags. Fields it omits keep their value
    /// from the lower-precedence sources.
    pub fn load(path: Option<&Path>, overrides: impl Serialize) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// Checks that all required options are present and numeric options are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_name.trim().is_empty() {
            return Err(ConfigError::Missing("accountName"));
        }
        let has_key = self
            .account_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().as_str().trim().is_empty());
        if !has_key {
            return Err(ConfigError::Missing("accountKey"));
        }
        if self.container_name.trim().is_empty() {
            return Err(ConfigError::Missing("containerName"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if self.block_size.as_u64() == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        Ok(())
    }
}
