//! The synthetic payload that every job transfers.

use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use blobbench_client::PayloadStream;
use bytes::Bytes;
use futures_util::StreamExt;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tempfile::NamedTempFile;
use tokio_util::io::ReaderStream;

/// Size of the random chunks written while generating a payload file.
const GENERATE_CHUNK_SIZE: usize = 1024 * 1024;

/// Size of the chunks read from the payload file per stream item.
const READ_CHUNK_SIZE: usize = 256 * 1024;

/// A fixed-size payload that can be opened any number of times, concurrently.
#[async_trait::async_trait]
pub trait PayloadSource: fmt::Debug + Send + Sync + 'static {
    /// Size of the payload in bytes.
    fn size(&self) -> u64;

    /// Opens an independent stream positioned at the start of the payload.
    ///
    /// The underlying handle is released when the stream is dropped.
    async fn open(&self) -> io::Result<PayloadStream>;
}

/// Random bytes in a temporary file.
///
/// The file is removed when the payload is dropped.
#[derive(Debug)]
pub struct TempFilePayload {
    file: NamedTempFile,
    size: u64,
}

impl TempFilePayload {
    /// Writes `size` random bytes into a new temporary file.
    pub async fn generate(size: u64) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::generate_blocking(size))
            .await
            .map_err(io::Error::other)?
    }

    fn generate_blocking(size: u64) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("blobbench_")
            .suffix(".bin")
            .tempfile()?;

        let mut rng = SmallRng::seed_from_u64(rand::random());
        let mut chunk = vec![0; GENERATE_CHUNK_SIZE];
        let mut writer = BufWriter::new(file.as_file());

        let mut remaining = size;
        while remaining > 0 {
            let len = remaining.min(GENERATE_CHUNK_SIZE as u64) as usize;
            rng.fill_bytes(&mut chunk[..len]);
            writer.write_all(&chunk[..len])?;
            remaining -= len as u64;
        }

        writer.flush()?;
        drop(writer);
        file.as_file().sync_all()?;

        tracing::debug!(path = %file.path().display(), size, "generated payload");
        Ok(Self { file, size })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[async_trait::async_trait]
impl PayloadSource for TempFilePayload {
    fn size(&self) -> u64 {
        self.size
    }

    async fn open(&self) -> io::Result<PayloadStream> {
        let file = tokio::fs::File::open(self.file.path()).await?;
        Ok(ReaderStream::with_capacity(file, READ_CHUNK_SIZE).boxed())
    }
}

/// A payload held in memory.
#[derive(Clone, Debug)]
pub struct BufferPayload(Bytes);

impl BufferPayload {
    pub fn new(contents: impl Into<Bytes>) -> Self {
        Self(contents.into())
    }
}

#[async_trait::async_trait]
impl PayloadSource for BufferPayload {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    async fn open(&self) -> io::Result<PayloadStream> {
        let contents = self.0.clone();
        Ok(futures_util::stream::once(async move { Ok(contents) }).boxed())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    async fn read_all(stream: PayloadStream) -> Vec<u8> {
        stream
            .try_fold(Vec::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn generates_file_of_requested_size() {
        let size = 3 * GENERATE_CHUNK_SIZE as u64 / 2;
        let payload = TempFilePayload::generate(size).await.unwrap();

        assert_eq!(payload.size(), size);
        assert_eq!(std::fs::metadata(payload.path()).unwrap().len(), size);
    }

    #[tokio::test]
    async fn opens_independent_streams() {
        let payload = TempFilePayload::generate(100_000).await.unwrap();

        let first = payload.open().await.unwrap();
        let second = payload.open().await.unwrap();
        let (first, second) = tokio::join!(read_all(first), read_all(second));

        assert_eq!(first.len(), 100_000);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn removes_file_on_drop() {
        let payload = TempFilePayload::generate(16).await.unwrap();
        let path = payload.path().to_owned();
        assert!(path.exists());

        drop(payload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn empty_payload() {
        let payload = TempFilePayload::generate(0).await.unwrap();
        assert!(read_all(payload.open().await.unwrap()).await.is_empty());
    }

    #[tokio::test]
    async fn buffer_payload_streams_contents() {
        let payload = BufferPayload::new(&b"oh hai!"[..]);
        assert_eq!(payload.size(), 7);
        assert_eq!(read_all(payload.open().await.unwrap()).await, b"oh hai!");
    }
}
