use blobbench::bench::{self, Phase};
use blobbench::config::{Config, ConfigSecret};
use blobbench::report::Reporter;
use blobbench_test::server::{ACCOUNT, ACCOUNT_KEY, CONTAINER, TestServer};
use bytesize::{ByteSize, MIB};
use secrecy::SecretBox;

fn config(server: &TestServer) -> Config {
    Config {
        account_name: ACCOUNT.into(),
        account_key: Some(SecretBox::new(Box::new(ConfigSecret::from(ACCOUNT_KEY)))),
        container_name: CONTAINER.into(),
        endpoint: Some(server.endpoint()),
        num_files: 5,
        file_size: 1,
        workers: 2,
        concurrency: 4,
        block_size: ByteSize::kib(256),
        ..Default::default()
    }
}

async fn run(config: &Config) -> (Vec<bench::RunStats>, String) {
    yansi::disable();
    let mut reporter = Reporter::new(Vec::new());
    let stats = bench::run(config, &mut reporter).await.unwrap();
    (stats, String::from_utf8(reporter.into_inner()).unwrap())
}

#[tokio::test]
async fn uploads_all_files() {
    blobbench_test::tracing::init();
    let server = TestServer::new().await;

    let (stats, output) = run(&config(&server)).await;

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].tally.successes(), 5);
    assert_eq!(stats[0].megabytes_per_file(), 1.0);

    assert_eq!(server.blob_count(), 5);
    for i in 1..=5 {
        let blob = server.blob(&format!("file_{i}.bin")).unwrap();
        assert_eq!(blob.len() as u64, MIB);
    }
    // Every 1 MiB file is staged as four 256 KiB blocks.
    assert_eq!(server.staged_blocks(), 20);

    assert!(output.contains("## Blob storage benchmark"));
    assert!(output.contains("File file_5.bin uploaded successfully!"));
    assert!(output.contains("Total upload time: "));
    assert!(output.contains("Throughput: "));
}

#[tokio::test]
async fn runs_all_phases() {
    let server = TestServer::new().await;
    let config = Config {
        download: true,
        cleanup: true,
        ..config(&server)
    };

    let (stats, _) = run(&config).await;

    let phases: Vec<_> = stats.iter().map(|stats| stats.phase).collect();
    assert_eq!(phases, [Phase::Upload, Phase::Download, Phase::Cleanup]);
    for stats in &stats {
        assert_eq!(stats.tally.successes(), 5, "{:?}", stats.phase);
    }
    assert_eq!(server.blob_count(), 0);
}

#[tokio::test]
async fn reports_failed_uploads() {
    let server = TestServer::new().await;
    server.fail_uploads_for("file_3.bin");

    let (stats, output) = run(&config(&server)).await;

    assert_eq!(stats[0].tally.successes(), 4);
    assert_eq!(stats[0].tally.failures()[0].0, "file_3.bin");
    assert!(output.contains("failed to upload file file_3.bin: "));
    assert!(server.blob("file_3.bin").is_none());
}

#[tokio::test]
async fn uploads_fail_with_wrong_account_key() {
    let server = TestServer::new().await;
    let config = Config {
        account_key: Some(SecretBox::new(Box::new(ConfigSecret::from("d3Jvbmcta2V5")))),
        ..config(&server)
    };

    let (stats, output) = run(&config).await;

    assert_eq!(stats[0].tally.successes(), 0);
    assert_eq!(stats[0].tally.failures().len(), 5);
    assert!(stats[0].tally.failures()[0].1.contains("AuthenticationFailed"));
    assert_eq!(output.matches("failed to upload file").count(), 5);
    assert_eq!(server.blob_count(), 0);
}

#[tokio::test]
async fn creates_container() {
    let server = TestServer::new().await;
    let config = Config {
        container_name: "fresh".into(),
        create_container: true,
        num_files: 1,
        ..config(&server)
    };

    let (stats, _) = run(&config).await;

    assert!(server.has_container("fresh"));
    assert_eq!(stats[0].tally.successes(), 1);
}

#[tokio::test]
async fn rejects_invalid_configuration() {
    let server = TestServer::new().await;
    let config = Config {
        container_name: String::new(),
        ..config(&server)
    };

    let mut reporter = Reporter::new(Vec::new());
    let err = bench::run(&config, &mut reporter).await.unwrap_err();

    assert!(err.to_string().contains("containerName"));
    assert!(reporter.into_inner().is_empty());
}

#[tokio::test]
async fn rejects_invalid_account_key() {
    let server = TestServer::new().await;
    let config = Config {
        account_key: Some(SecretBox::new(Box::new(ConfigSecret::from("not base64!")))),
        ..config(&server)
    };

    let mut reporter = Reporter::new(Vec::new());
    let err = bench::run(&config, &mut reporter).await.unwrap_err();

    assert!(format!("{err:#}").contains("invalid account key"));
}
