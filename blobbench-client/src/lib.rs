//! # Blobbench Client
//!
//! Storage clients that the benchmark harness uploads through. Every client implements
//! [`BlobClient`], which takes an object name and a [`PayloadStream`] and performs the transfer.
//! How a client splits or parallelizes a single transfer internally is up to the client.
//!
//! ## Usage
//!
//! ```no_run
//! use blobbench_client::{AzureBlobClient, BlobClient, PayloadStream};
//! use bytes::Bytes;
//! use futures_util::StreamExt;
//!
//! #[tokio::main]
//! # async fn main() -> blobbench_client::Result<()> {
//!     let client = AzureBlobClient::builder("myaccount", "bXlrZXk=", "benchmarks").build()?;
//!
//!     let body = Bytes::from_static(b"Hello, world!");
//!     let stream: PayloadStream = futures_util::stream::once(async move { Ok(body) }).boxed();
//!     client.upload("hello.txt", stream, 4).await?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod azure;
mod backend;
mod error;
mod local_fs;

pub use azure::*;
pub use backend::*;
pub use error::*;
pub use local_fs::*;
