use blobbench_client::{AzureBlobClient, BlobClient, Error, PayloadStream};
use blobbench_test::server::{ACCOUNT, ACCOUNT_KEY, CONTAINER, TestServer};
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::StatusCode;

fn client(server: &TestServer, container: &str, block_size: usize) -> AzureBlobClient {
    AzureBlobClient::builder(ACCOUNT, ACCOUNT_KEY, container)
        .endpoint(server.endpoint())
        .block_size(block_size)
        .build()
        .unwrap()
}

/// Splits the contents into chunks that do not line up with the block size.
fn chunked(contents: &'static [u8], chunk: usize) -> PayloadStream {
    let chunks: Vec<_> = contents
        .chunks(chunk)
        .map(|chunk| Ok(Bytes::from_static(chunk)))
        .collect();
    futures_util::stream::iter(chunks).boxed()
}

#[tokio::test]
async fn uploads_small_payload_in_one_request() {
    blobbench_test::tracing::init();
    let server = TestServer::new().await;
    let client = client(&server, CONTAINER, 1024);

    client
        .upload("file_1.bin", chunked(b"oh hai!", 3), 4)
        .await
        .unwrap();

    assert_eq!(server.blob("file_1.bin").unwrap(), "oh hai!");
    assert_eq!(server.staged_blocks(), 0);
}

#[tokio::test]
async fn uploads_empty_payload() {
    let server = TestServer::new().await;
    let client = client(&server, CONTAINER, 1024);

    client
        .upload("file_1.bin", chunked(b"", 1), 4)
        .await
        .unwrap();

    assert_eq!(server.blob("file_1.bin").unwrap(), "");
}

#[tokio::test]
async fn uploads_large_payload_in_blocks() {
    blobbench_test::tracing::init();
    let server = TestServer::new().await;
    let client = client(&server, CONTAINER, 4);

    let contents = b"the quick brown fox jumps over the lazy dog";
    client
        .upload("file_1.bin", chunked(contents, 5), 3)
        .await
        .unwrap();

    // Blocks are committed in order, even though they are staged concurrently.
    assert_eq!(server.blob("file_1.bin").unwrap(), &contents[..]);
    assert_eq!(server.staged_blocks(), contents.len().div_ceil(4));
}

#[tokio::test]
async fn downloads_uploaded_blob() {
    let server = TestServer::new().await;
    let client = client(&server, CONTAINER, 4);

    client
        .upload("file_1.bin", chunked(b"0123456789", 10), 2)
        .await
        .unwrap();

    assert_eq!(client.download("file_1.bin").await.unwrap(), 10);
}

#[tokio::test]
async fn download_of_missing_blob_fails() {
    let server = TestServer::new().await;
    let client = client(&server, CONTAINER, 1024);

    let err = client.download("file_1.bin").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn deletes_blobs() {
    let server = TestServer::new().await;
    let client = client(&server, CONTAINER, 1024);

    client
        .upload("file_1.bin", chunked(b"oh hai!", 7), 1)
        .await
        .unwrap();
    client.delete("file_1.bin").await.unwrap();
    assert_eq!(server.blob_count(), 0);

    // Deleting again is not an error.
    client.delete("file_1.bin").await.unwrap();
}

#[tokio::test]
async fn creates_container_once() {
    let server = TestServer::new().await;
    let client = client(&server, "fresh", 1024);

    let err = client
        .upload("file_1.bin", chunked(b"oh hai!", 7), 1)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    client.prepare().await.unwrap();
    assert!(server.has_container("fresh"));

    // The container exists now, which must not fail.
    client.prepare().await.unwrap();
    client
        .upload("file_1.bin", chunked(b"oh hai!", 7), 1)
        .await
        .unwrap();
}

#[tokio::test]
async fn reports_service_errors() {
    let server = TestServer::new().await;
    server.fail_uploads_for("file_2.bin");
    let client = client(&server, CONTAINER, 4);

    let err = client
        .upload("file_2.bin", chunked(b"0123456789", 10), 2)
        .await
        .unwrap_err();

    match err {
        Error::Status { status, code, .. } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(code, "InternalError");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.blob("file_2.bin").is_none());
}

#[tokio::test]
async fn rejects_requests_signed_with_wrong_key() {
    let server = TestServer::new().await;
    let client = AzureBlobClient::builder(ACCOUNT, "d3Jvbmcta2V5", CONTAINER)
        .endpoint(server.endpoint())
        .block_size(4)
        .build()
        .unwrap();

    let assert_forbidden = |err: Error| match err {
        Error::Status { status, code, .. } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(code, "AuthenticationFailed");
        }
        other => panic!("unexpected error: {other:?}"),
    };

    // A single Put Blob, and a payload staged in blocks.
    let err = client
        .upload("file_1.bin", chunked(b"oh", 2), 1)
        .await
        .unwrap_err();
    assert_forbidden(err);
    let err = client
        .upload("file_2.bin", chunked(b"0123456789", 3), 2)
        .await
        .unwrap_err();
    assert_forbidden(err);

    assert_forbidden(client.download("file_1.bin").await.unwrap_err());
    assert_forbidden(client.delete("file_1.bin").await.unwrap_err());
    assert_forbidden(client.prepare().await.unwrap_err());

    assert_eq!(server.blob_count(), 0);
    assert_eq!(server.staged_blocks(), 0);
}
