use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use serde::Serialize;

use crate::bench;
use crate::config::{Config, ConfigError};
use crate::observability;
use crate::report::Reporter;

/// Measures upload throughput to Azure Blob Storage.
///
/// Uploads copies of a random payload through a pool of concurrent workers and reports the total
/// time and throughput. Options can also be set in a YAML file or via `BLOBBENCH__*` environment
/// variables.
#[derive(Parser)]
#[command(name = "blobbench", version)]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Azure Storage account name.
    #[arg(long = "accountName", visible_alias = "account-name")]
    pub account_name: Option<String>,

    /// Azure Storage account key.
    #[arg(long = "accountKey", visible_alias = "account-key")]
    pub account_key: Option<String>,

    /// Azure Blob Storage container name.
    #[arg(long = "containerName", visible_alias = "container-name")]
    pub container_name: Option<String>,

    /// Number of files to upload [default: 1000].
    #[arg(long = "numFiles", visible_alias = "num-files")]
    pub num_files: Option<u64>,

    /// Size of each file in MB [default: 64].
    #[arg(long = "fileSize", visible_alias = "file-size", value_name = "MB")]
    pub file_size: Option<u64>,

    /// Number of concurrent workers [default: 8].
    #[arg(long)]
    pub workers: Option<usize>,

    /// Concurrency level for each upload [default: 16].
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Blob service endpoint, for example of a local storage emulator.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Prefix of object names [default: file].
    #[arg(long)]
    pub prefix: Option<String>,

    /// Create the container if it does not exist.
    #[arg(long = "createContainer", visible_alias = "create-container")]
    pub create_container: bool,

    /// Download and verify all files after uploading.
    #[arg(long)]
    pub download: bool,

    /// Delete all files at the end of the run.
    #[arg(long)]
    pub cleanup: bool,
}

/// Configuration values set on the command line.
///
/// Unset options are skipped so they do not shadow the file or environment.
#[derive(Debug, Default, Serialize)]
pub struct Overrides<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    account_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_files: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    create_container: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    download: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleanup: Option<bool>,
}

impl Args {
    pub fn overrides(&self) -> Overrides<'_> {
        // Switches can only turn features on.
        let switch = |set: bool| set.then_some(true);

        Overrides {
            account_name: self.account_name.as_deref(),
            account_key: self.account_key.as_deref(),
            container_name: self.container_name.as_deref(),
            num_files: self.num_files,
            file_size: self.file_size,
            workers: self.workers,
            concurrency: self.concurrency,
            endpoint: self.endpoint.as_deref(),
            prefix: self.prefix.as_deref(),
            create_container: switch(self.create_container),
            download: switch(self.download),
            cleanup: switch(self.cleanup),
        }
    }
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref(), args.overrides())?;

    if let Err(err) = config.validate() {
        let kind = match err {
            ConfigError::Missing(_) => ErrorKind::MissingRequiredArgument,
            ConfigError::Zero(_) | ConfigError::BlockSize(_) => ErrorKind::ValueValidation,
        };
        Args::command().error(kind, err).exit();
    }

    yansi::whenever(yansi::Condition::TTY_AND_COLOR);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("blobbench")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    runtime.block_on(async move {
        bench::run(&config, &mut Reporter::stdout()).await?;
        Ok(())
    })
}
