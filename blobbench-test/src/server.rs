//! Exposes an in-process mock of the Azure Blob service for use in integration tests.
//!
//! ```
//! use blobbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let endpoint = server.endpoint();
//!    // point an `AzureBlobClient` at the endpoint...
//! }
//! ```
//!
//! The mock understands the subset of the Blob REST API the client uses: container creation,
//! `Put Blob`, `Put Block`, `Put Block List`, `Get Blob` and `Delete Blob`. Requests are addressed
//! path-style, like the storage emulator: `/{account}/{container}/{blob}`.
//!
//! Every request must carry a valid Shared Key signature for [`ACCOUNT`] and [`ACCOUNT_KEY`].
//! The server rebuilds the string-to-sign from the request it received and rejects mismatches with
//! `403 AuthenticationFailed`.

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// The storage account name the mock expects in the `Authorization` header.
pub const ACCOUNT: &str = "devstoreaccount1";

/// A base64-encoded account key accepted by the mock.
pub const ACCOUNT_KEY: &str = "YmxvYmJlbmNoLXRlc3Qta2V5";

/// The container that exists when the server starts.
pub const CONTAINER: &str = "benchmarks";

/// Standard headers covered by the signature, in signing order.
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

type BlobKey = (String, String);
type QueryParams = HashMap<String, String>;

#[derive(Debug, Default)]
struct Storage {
    containers: HashSet<String>,
    blobs: HashMap<BlobKey, Bytes>,
    staged: HashMap<BlobKey, HashMap<String, Bytes>>,
    failing: HashSet<String>,
    staged_blocks: usize,
}

type SharedStorage = Arc<Mutex<Storage>>;

/// An in-process mock Blob service for use in integration tests.
///
/// Blobs are kept in memory. The server listens on a random available port on localhost and stops
/// when it is dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    storage: SharedStorage,
}

impl TestServer {
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let storage = SharedStorage::default();
        storage.lock().unwrap().containers.insert(CONTAINER.into());

        let app = Router::new()
            .route("/{account}/{container}", put(create_container))
            .route(
                "/{account}/{container}/{*blob}",
                put(put_blob).get(get_blob).delete(delete_blob),
            )
            .layer(middleware::from_fn(authenticate))
            .with_state(Arc::clone(&storage));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            storage,
        }
    }

    /// Returns the endpoint for [`ACCOUNT`], including the account path segment.
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}/{ACCOUNT}", self.socket.port())
    }

    /// Returns the contents of a committed blob in [`CONTAINER`].
    pub fn blob(&self, name: &str) -> Option<Bytes> {
        let key = (CONTAINER.to_owned(), name.to_owned());
        self.storage.lock().unwrap().blobs.get(&key).cloned()
    }

    /// Returns the number of committed blobs across all containers.
    pub fn blob_count(&self) -> usize {
        self.storage.lock().unwrap().blobs.len()
    }

    /// Returns whether the given container exists.
    pub fn has_container(&self, container: &str) -> bool {
        self.storage.lock().unwrap().containers.contains(container)
    }

    /// Returns the number of `Put Block` requests served so far.
    pub fn staged_blocks(&self) -> usize {
        self.storage.lock().unwrap().staged_blocks
    }

    /// Makes every write to the blob with the given name fail with `500 Internal Server Error`.
    pub fn fail_uploads_for(&self, name: &str) {
        self.storage.lock().unwrap().failing.insert(name.to_owned());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn error(status: StatusCode, code: &'static str) -> Response {
    let body = format!(r#"<?xml version="1.0" encoding="utf-8"?><Error><Code>{code}</Code></Error>"#);
    (status, [("x-ms-error-code", code)], body).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Rebuilds the Shared Key string-to-sign of a received request.
fn string_to_sign(request: &Request) -> String {
    let headers = request.headers();
    let mut signed = format!("{}\n", request.method());

    for name in SIGNED_HEADERS {
        let value = match header(headers, name) {
            "0" if name == "content-length" => "",
            value => value,
        };
        signed.push_str(value);
        signed.push('\n');
    }

    let mut ms_headers: Vec<_> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or_default().trim()))
        .collect();
    ms_headers.sort();
    for (name, value) in ms_headers {
        signed.push_str(&format!("{name}:{value}\n"));
    }

    signed.push_str(&format!("/{ACCOUNT}{}", request.uri().path()));

    let query = request.uri().query().unwrap_or_default();
    let mut params: Vec<_> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.to_lowercase(), value.into_owned()))
        .collect();
    params.sort();
    for (name, value) in params {
        signed.push_str(&format!("\n{name}:{value}"));
    }

    signed
}

fn expected_authorization(request: &Request) -> String {
    let key = STANDARD.decode(ACCOUNT_KEY).unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
    mac.update(string_to_sign(request).as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());
    format!("SharedKey {ACCOUNT}:{signature}")
}

async fn authenticate(request: Request, next: Next) -> Response {
    let headers = request.headers();
    let authorized = header(headers, "authorization") == expected_authorization(&request)
        && headers.contains_key("x-ms-date")
        && headers.contains_key("x-ms-version");

    if authorized {
        return next.run(request).await;
    }

    // Drain the body so the client reads the response instead of a reset connection.
    let _ = axum::body::to_bytes(request.into_body(), usize::MAX).await;
    error(StatusCode::FORBIDDEN, "AuthenticationFailed")
}

fn parse_block_list(body: &[u8]) -> Option<Vec<String>> {
    let body = std::str::from_utf8(body).ok()?;
    let ids = body
        .split("<Latest>")
        .skip(1)
        .filter_map(|part| part.split_once("</Latest>"))
        .map(|(id, _)| id.to_owned())
        .collect();
    Some(ids)
}

async fn create_container(
    State(storage): State<SharedStorage>,
    Path((_account, container)): Path<(String, String)>,
    Query(query): Query<QueryParams>,
) -> Response {
    if query.get("restype").map(String::as_str) != Some("container") {
        return error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    if storage.lock().unwrap().containers.insert(container) {
        StatusCode::CREATED.into_response()
    } else {
        error(StatusCode::CONFLICT, "ContainerAlreadyExists")
    }
}

async fn put_blob(
    State(storage): State<SharedStorage>,
    Path((_account, container, blob)): Path<(String, String, String)>,
    Query(query): Query<QueryParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut storage = storage.lock().unwrap();
    if !storage.containers.contains(&container) {
        return error(StatusCode::NOT_FOUND, "ContainerNotFound");
    }
    if storage.failing.contains(&blob) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError");
    }

    let key = (container, blob);
    match query.get("comp").map(String::as_str) {
        None => {
            let blob_type = headers
                .get("x-ms-blob-type")
                .and_then(|value| value.to_str().ok());
            if blob_type != Some("BlockBlob") {
                return error(StatusCode::BAD_REQUEST, "MissingRequiredHeader");
            }
            storage.blobs.insert(key, body);
        }
        Some("block") => {
            let Some(block_id) = query.get("blockid") else {
                return error(StatusCode::BAD_REQUEST, "MissingRequiredQueryParameter");
            };
            storage
                .staged
                .entry(key)
                .or_default()
                .insert(block_id.clone(), body);
            storage.staged_blocks += 1;
        }
        Some("blocklist") => {
            let Some(block_ids) = parse_block_list(&body) else {
                return error(StatusCode::BAD_REQUEST, "InvalidXmlDocument");
            };
            let staged = storage.staged.remove(&key).unwrap_or_default();

            let mut contents = BytesMut::new();
            for block_id in &block_ids {
                match staged.get(block_id) {
                    Some(block) => contents.extend_from_slice(block),
                    None => return error(StatusCode::BAD_REQUEST, "InvalidBlockList"),
                }
            }
            storage.blobs.insert(key, contents.freeze());
        }
        Some(_) => return error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue"),
    }

    StatusCode::CREATED.into_response()
}

async fn get_blob(
    State(storage): State<SharedStorage>,
    Path((_account, container, blob)): Path<(String, String, String)>,
) -> Response {
    match storage.lock().unwrap().blobs.get(&(container, blob)) {
        Some(contents) => contents.clone().into_response(),
        None => error(StatusCode::NOT_FOUND, "BlobNotFound"),
    }
}

async fn delete_blob(
    State(storage): State<SharedStorage>,
    Path((_account, container, blob)): Path<(String, String, String)>,
) -> Response {
    match storage.lock().unwrap().blobs.remove(&(container, blob)) {
        Some(_) => StatusCode::ACCEPTED.into_response(),
        None => error(StatusCode::NOT_FOUND, "BlobNotFound"),
    }
}
