//! A [`BlobClient`] for Azure Blob Storage, speaking the Blob service REST API directly.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::Utc;
use futures_util::{StreamExt, TryStreamExt};
use futures_util::stream::try_unfold;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use url::Url;

use crate::{BlobClient, Error, PayloadStream, Result, USER_AGENT};

mod auth;

use auth::{API_VERSION, CanonicalRequest, SharedKey};

/// Size of a single staged block, unless configured otherwise.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Number of digits in a block index. All block IDs of a blob must have the same length.
const BLOCK_ID_DIGITS: usize = 6;

#[derive(Debug)]
struct ClientBuilderInner {
    key: SharedKey,
    container: String,
    endpoint: Option<Url>,
    block_size: usize,
    reqwest_builder: reqwest::ClientBuilder,
}

/// Builder to create an [`AzureBlobClient`].
#[must_use]
#[derive(Debug)]
pub struct AzureBlobClientBuilder(Result<ClientBuilderInner>);

impl AzureBlobClientBuilder {
    /// Creates a new builder for the given storage account, base64-encoded account key and
    /// container.
    pub fn new(account: &str, key: &str, container: &str) -> Self {
        let key = match SharedKey::new(account, key) {
            Ok(key) => key,
            Err(err) => return Self(Err(err)),
        };

        let reqwest_builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT);

        Self(Ok(ClientBuilderInner {
            key,
            container: container.to_owned(),
            endpoint: None,
            block_size: DEFAULT_BLOCK_SIZE,
            reqwest_builder,
        }))
    }

    /// Overrides the service endpoint, for example to target a local storage emulator.
    ///
    /// Defaults to `https://{account}.blob.core.windows.net/`.
    pub fn endpoint(self, endpoint: impl reqwest::IntoUrl) -> Self {
        let Ok(mut inner) = self.0 else { return self };
        match endpoint.into_url() {
            Ok(url) => {
                inner.endpoint = Some(url);
                Self(Ok(inner))
            }
            Err(err) => Self(Err(err.into())),
        }
    }

    /// Sets the size of the blocks that larger uploads are split into.
    pub fn block_size(mut self, block_size: usize) -> Self {
        if let Ok(ref mut inner) = self.0 {
            inner.block_size = block_size.max(1);
        }
        self
    }

    /// Returns an [`AzureBlobClient`] that uses this builder's configuration.
    ///
    /// # Errors
    ///
    /// This method fails if:
    /// - the account key is not valid base64
    /// - the endpoint is invalid, or no default endpoint can be derived from the account name
    /// - the [`reqwest::Client`] fails to build
    pub fn build(self) -> Result<AzureBlobClient> {
        let inner = self.0?;

        let endpoint = match inner.endpoint {
            Some(endpoint) => endpoint,
            None => {
                let endpoint = format!("https://{}.blob.core.windows.net/", inner.key.account());
                Url::parse(&endpoint).map_err(|err| Error::InvalidUrl {
                    message: format!("invalid endpoint `{endpoint}`: {err}"),
                })?
            }
        };

        if endpoint.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                message: format!("endpoint `{endpoint}` cannot be used as a base URL"),
            });
        }

        Ok(AzureBlobClient {
            reqwest: inner.reqwest_builder.build()?,
            endpoint,
            key: inner.key,
            container: inner.container,
            block_size: inner.block_size,
        })
    }
}

/// A client for a single Azure Blob Storage container, authenticated with a Shared Key.
///
/// Payloads that fit into a single block are written with one `Put Blob` request. Larger payloads
/// are split into blocks which are staged with `Put Block`, keeping up to `concurrency` blocks in
/// flight, and committed with a final `Put Block List`.
#[derive(Debug)]
pub struct AzureBlobClient {
    reqwest: reqwest::Client,
    endpoint: Url,
    key: SharedKey,
    container: String,
    block_size: usize,
}

impl AzureBlobClient {
    /// Creates a new [`AzureBlobClientBuilder`].
    pub fn builder(account: &str, key: &str, container: &str) -> AzureBlobClientBuilder {
        AzureBlobClientBuilder::new(account, key, container)
    }

    /// The endpoint requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, name: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| Error::InvalidUrl {
                message: format!("endpoint `{}` cannot be used as a base URL", self.endpoint),
            })?;
            segments.pop_if_empty().push(&self.container);
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }

    /// Creates a signed request against the container, or a blob within it.
    fn request(
        &self,
        method: Method,
        name: Option<&str>,
        query: &[(&str, String)],
        mut headers: Vec<(&'static str, String)>,
        body: Option<Bytes>,
    ) -> Result<RequestBuilder> {
        let url = self.url(name)?;

        headers.push((
            "x-ms-date",
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ));
        headers.push(("x-ms-version", API_VERSION.to_owned()));

        let authorization = self.key.authorization(&CanonicalRequest {
            method: &method,
            path: url.path(),
            query,
            headers: &headers,
            content_length: body.as_ref().map_or(0, |body| body.len() as u64),
        });

        let mut builder = self
            .reqwest
            .request(method, url)
            .header(AUTHORIZATION, authorization);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        Ok(builder)
    }

    async fn put_blob(&self, name: &str, body: Bytes) -> Result<()> {
        let headers = vec![("x-ms-blob-type", "BlockBlob".to_owned())];
        let request = self.request(Method::PUT, Some(name), &[], headers, Some(body))?;
        send(request).await?;
        Ok(())
    }

    async fn put_block(&self, name: &str, index: usize, block: Bytes) -> Result<String> {
        let block_id = block_id(index);
        let query = [("comp", "block".to_owned()), ("blockid", block_id.clone())];
        let request = self.request(Method::PUT, Some(name), &query, vec![], Some(block))?;
        send(request).await?;
        Ok(block_id)
    }

    async fn put_block_list(&self, name: &str, block_ids: &[String]) -> Result<()> {
        let query = [("comp", "blocklist".to_owned())];
        let body = Bytes::from(block_list_xml(block_ids));
        let request = self.request(Method::PUT, Some(name), &query, vec![], Some(body))?;
        send(request).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobClient for AzureBlobClient {
    fn name(&self) -> &'static str {
        "azure-blob"
    }

    #[tracing::instrument(level = "trace", skip_all, fields(container = %self.container))]
    async fn prepare(&self) -> Result<()> {
        let query = [("restype", "container".to_owned())];
        let request = self.request(Method::PUT, None, &query, vec![], Some(Bytes::new()))?;
        match send(request).await {
            Ok(_) => {
                tracing::debug!("created container");
                Ok(())
            }
            Err(err) if err.status() == Some(StatusCode::CONFLICT) => {
                tracing::debug!("container already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(name = %name))]
    async fn upload(&self, name: &str, stream: PayloadStream, concurrency: usize) -> Result<()> {
        let mut reader = StreamReader::new(stream);

        let first = read_block(&mut reader, self.block_size)
            .await?
            .unwrap_or_default();
        if first.len() < self.block_size {
            tracing::trace!(size = first.len(), "uploading in a single request");
            return self.put_blob(name, first).await;
        }

        let block_size = self.block_size;
        let blocks = try_unfold(
            (reader, Some(first), 0usize),
            move |(mut reader, pending, index)| async move {
                let block = match pending {
                    Some(block) => Some(block),
                    None => read_block(&mut reader, block_size).await?,
                };
                Ok::<_, Error>(block.map(|block| ((index, block), (reader, None, index + 1))))
            },
        )
        .boxed();

        let block_ids: Vec<String> = blocks
            .map_ok(|(index, block)| self.put_block(name, index, block))
            .try_buffered(concurrency.max(1))
            .try_collect()
            .await?;

        tracing::trace!(blocks = block_ids.len(), "committing block list");
        self.put_block_list(name, &block_ids).await
    }

    #[tracing::instrument(level = "trace", skip_all, fields(name = %name))]
    async fn download(&self, name: &str) -> Result<u64> {
        let request = self.request(Method::GET, Some(name), &[], vec![], None)?;
        let mut stream = send(request).await?.bytes_stream();

        let mut received = 0;
        while let Some(chunk) = stream.try_next().await? {
            received += chunk.len() as u64;
        }
        Ok(received)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(name = %name))]
    async fn delete(&self, name: &str) -> Result<()> {
        let request = self.request(Method::DELETE, Some(name), &[], vec![], None)?;
        match send(request).await {
            Ok(_) => Ok(()),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Sends the request and turns non-success responses into [`Error::Status`].
async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let message = response.text().await.unwrap_or_default();

    Err(Error::Status {
        status,
        code,
        message,
    })
}

/// Reads up to `size` bytes, returning `None` once the reader is exhausted.
async fn read_block<R>(reader: &mut R, size: usize) -> std::io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut block = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut block).await?;
    Ok((!block.is_empty()).then(|| Bytes::from(block)))
}

fn block_id(index: usize) -> String {
    STANDARD.encode(format!("{index:0width$}", width = BLOCK_ID_DIGITS))
}

fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for block_id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(block_id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "YmxvYmJlbmNoLXRlc3Qta2V5";

    #[test]
    fn block_ids_have_fixed_width() {
        assert_eq!(block_id(1), "MDAwMDAx");
        assert_eq!(block_id(0).len(), block_id(99_999).len());
    }

    #[test]
    fn renders_block_list() {
        let xml = block_list_xml(&[block_id(0), block_id(1)]);
        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="utf-8"?><BlockList><Latest>MDAwMDAw</Latest><Latest>MDAwMDAx</Latest></BlockList>"#
        );
    }

    #[tokio::test]
    async fn splits_reader_into_blocks() {
        let mut reader: &[u8] = b"0123456789";

        let mut blocks = Vec::new();
        while let Some(block) = read_block(&mut reader, 4).await.unwrap() {
            blocks.push(block);
        }

        assert_eq!(blocks, [&b"0123"[..], &b"4567"[..], &b"89"[..]]);
    }

    #[test]
    fn derives_default_endpoint() {
        let client = AzureBlobClient::builder("myaccount", KEY, "benchmarks")
            .build()
            .unwrap();

        assert_eq!(
            client.endpoint().as_str(),
            "https://myaccount.blob.core.windows.net/"
        );
        assert_eq!(
            client.url(Some("file_1.bin")).unwrap().as_str(),
            "https://myaccount.blob.core.windows.net/benchmarks/file_1.bin"
        );
    }

    #[test]
    fn keeps_endpoint_path() {
        let client = AzureBlobClient::builder("devstoreaccount1", KEY, "benchmarks")
            .endpoint("http://127.0.0.1:10000/devstoreaccount1")
            .build()
            .unwrap();

        assert_eq!(
            client.url(None).unwrap().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/benchmarks"
        );
    }

    #[test]
    fn fails_on_invalid_key() {
        let result = AzureBlobClient::builder("myaccount", "%%%", "benchmarks").build();
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }
}
