use std::sync::Arc;

use blobbench::bench::{Benchmark, Settings};
use blobbench::payload::{PayloadSource, TempFilePayload};
use blobbench::report::Reporter;
use blobbench_client::{BlobClient, LocalFs};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn round_trips_through_local_directory() {
    blobbench_test::tracing::init();
    let tempdir = tempfile::tempdir().unwrap();
    let client = Arc::new(LocalFs::new(tempdir.path().join("objects")));
    client.prepare().await.unwrap();

    let settings = Settings {
        num_files: 12,
        workers: 4,
        ..Default::default()
    };
    let benchmark = Benchmark::new(client.clone(), settings);
    let payload = TempFilePayload::generate(300_000).await.unwrap();
    let original = std::fs::read(payload.path()).unwrap();
    let payload: Arc<dyn PayloadSource> = Arc::new(payload);
    let mut reporter = Reporter::new(std::io::sink());

    let upload = benchmark
        .upload(Arc::clone(&payload), &mut reporter)
        .await
        .unwrap();
    assert_eq!(upload.tally.successes(), 12);
    assert_eq!(upload.bytes_per_file, 300_000);

    for i in 1..=12 {
        let stored = std::fs::read(client.path().join(format!("file_{i}.bin"))).unwrap();
        assert!(stored == original, "file_{i}.bin differs from the payload");
    }

    let download = benchmark.download(300_000, &mut reporter).await.unwrap();
    assert_eq!(download.tally.successes(), 12);

    let cleanup = benchmark.cleanup(&mut reporter).await.unwrap();
    assert_eq!(cleanup.tally.successes(), 12);
    assert_eq!(std::fs::read_dir(client.path()).unwrap().count(), 0);
}
