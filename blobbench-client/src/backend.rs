use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::Result;

/// Type alias for data streams handed to [`BlobClient::upload`].
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A shareable, type-erased [`BlobClient`] instance.
pub type SharedClient = Arc<dyn BlobClient>;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("blobbench/", env!("CARGO_PKG_VERSION"));

/// A remote object store that objects can be written to, read back from and deleted from.
#[async_trait::async_trait]
pub trait BlobClient: Debug + Send + Sync + 'static {
    /// The client name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Prepares the destination, for example by creating the target container.
    ///
    /// Calling this on a destination that already exists succeeds.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Uploads the full `stream` as object `name`, replacing any existing object.
    ///
    /// `concurrency` is a hint for how many parts of this single upload may be in flight at once.
    async fn upload(&self, name: &str, stream: PayloadStream, concurrency: usize) -> Result<()>;

    /// Reads object `name` to the end and returns the number of bytes received.
    async fn download(&self, name: &str) -> Result<u64>;

    /// Deletes object `name`. Deleting an object that does not exist succeeds.
    async fn delete(&self, name: &str) -> Result<()>;
}
