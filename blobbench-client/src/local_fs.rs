use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;

use crate::{BlobClient, PayloadStream, Result};

/// A [`BlobClient`] that writes objects as files into a local directory.
///
/// Object names are joined onto the directory path. This is useful to benchmark local disks and to
/// run the harness without network access.
#[derive(Debug)]
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    /// Creates a client that stores objects below `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory objects are stored in.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl BlobClient for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    async fn upload(&self, name: &str, stream: PayloadStream, _concurrency: usize) -> Result<()> {
        let path = self.path.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;

        let mut reader = StreamReader::new(stream);
        let mut writer = BufWriter::new(file);

        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_data().await?;

        Ok(())
    }

    async fn download(&self, name: &str) -> Result<u64> {
        let mut file = File::open(self.path.join(name)).await?;
        Ok(tokio::io::copy(&mut file, &mut tokio::io::sink()).await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path.join(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
