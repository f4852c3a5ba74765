use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use resource_downloader::{
    ApiClient, ApiConfig, DownloadConfig, DownloadManager, DownloadOptions, TransferStatus,
    TransferStrategy, TransferTarget,
};

fn fast_config() -> DownloadConfig {
    DownloadConfig {
        completed_retention: Duration::from_millis(150),
        failed_retention: Duration::from_millis(250),
        ..Default::default()
    }
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 3s");
}

/// Resolve a logical resource through the API client, download it through
/// the manager, observe progress and completion, then watch the entry get
/// evicted and the identifier become reusable.
#[tokio::test]
async fn test_resolve_download_and_cleanup() {
    let mut server = mockito::Server::new_async().await;
    let body: Vec<u8> = (0..131072u32).map(|i| (i * 7 % 256) as u8).collect();

    let file_url = format!("{}/files/notes.pdf", server.url());
    let _resource = server
        .mock("GET", "/api/resources/42")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"fileUrl":"{file_url}","fileName":"lecture notes: week 1.pdf","fileType":"application/pdf","fileSize":{}}}"#,
            body.len()
        ))
        .create_async()
        .await;
    let _file = server
        .mock("GET", "/files/notes.pdf")
        .with_status(200)
        .with_body(body.clone())
        .create_async()
        .await;

    let api = ApiClient::new(ApiConfig {
        base_url: format!("{}/api", server.url()),
    });
    let target = api.resolve_target("42").await.unwrap();
    assert_eq!(target.declared_type.as_deref(), Some("application/pdf"));

    let manager = DownloadManager::new(fast_config());
    let progress: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let payload: Arc<Mutex<Option<Bytes>>> = Arc::new(Mutex::new(None));
    let progress_sink = Arc::clone(&progress);
    let payload_sink = Arc::clone(&payload);

    let options = DownloadOptions {
        on_progress: Some(Arc::new(move |percent| {
            progress_sink.lock().push(percent);
        })),
        on_success: Some(Arc::new(move |bytes: Bytes| {
            *payload_sink.lock() = Some(bytes);
        })),
        on_error: None,
    };

    assert!(manager.start("42", target, options));
    assert!(manager.is_active("42"));

    wait_until(|| {
        manager
            .get("42")
            .map(|s| s.status == TransferStatus::Completed)
            .unwrap_or(false)
    })
    .await;

    let state = manager.get("42").unwrap();
    assert_eq!(state.progress, 100);
    // Reserved characters in the suggested name were cleaned up.
    assert_eq!(state.display_name, "lecture notes_ week 1.pdf");
    assert_eq!(state.status_line(), "Downloaded lecture notes_ week 1.pdf");

    let seen = progress.lock().clone();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 100);
    assert_eq!(&payload.lock().as_ref().unwrap()[..], &body[..]);

    // Terminal cleanup: the entry goes away and the identifier is free.
    wait_until(|| manager.get("42").is_none()).await;
    assert!(manager.start(
        "42",
        TransferTarget::new(format!("{}/files/notes.pdf", server.url()), "notes.pdf"),
        DownloadOptions::default(),
    ));
    wait_until(|| {
        manager
            .get("42")
            .map(|s| s.status == TransferStatus::Completed)
            .unwrap_or(false)
    })
    .await;
}

/// With the simple strategy only, the download completes with no progress
/// callbacks and still ends at 100%.
#[tokio::test]
async fn test_simple_strategy_completes_without_progress() {
    let mut server = mockito::Server::new_async().await;
    let _file = server
        .mock("GET", "/files/a.txt")
        .with_status(200)
        .with_body(b"plain contents".to_vec())
        .create_async()
        .await;

    let manager = DownloadManager::new(DownloadConfig {
        strategies: vec![TransferStrategy::Simple],
        ..fast_config()
    });

    let progress: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let progress_sink = Arc::clone(&progress);
    let options = DownloadOptions {
        on_progress: Some(Arc::new(move |percent| {
            progress_sink.lock().push(percent);
        })),
        ..Default::default()
    };

    manager.start(
        "a",
        TransferTarget::new(format!("{}/files/a.txt", server.url()), "a.txt"),
        options,
    );

    wait_until(|| {
        manager
            .get("a")
            .map(|s| s.status == TransferStatus::Completed)
            .unwrap_or(false)
    })
    .await;

    assert_eq!(manager.get("a").unwrap().progress, 100);
    assert!(progress.lock().is_empty());
}

/// A body with no advertised length completes without any intermediate
/// percentages rather than reporting nonsense.
#[tokio::test]
async fn test_unknown_total_size_withholds_progress() {
    let mut server = mockito::Server::new_async().await;
    let _file = server
        .mock("GET", "/files/stream.bin")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(&[3u8; 8192])?;
            w.write_all(&[5u8; 8192])
        })
        .create_async()
        .await;

    let manager = DownloadManager::new(fast_config());
    let progress: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let progress_sink = Arc::clone(&progress);
    let payload: Arc<Mutex<Option<Bytes>>> = Arc::new(Mutex::new(None));
    let payload_sink = Arc::clone(&payload);

    manager.start(
        "s",
        TransferTarget::new(format!("{}/files/stream.bin", server.url()), "stream.bin"),
        DownloadOptions {
            on_progress: Some(Arc::new(move |percent| {
                progress_sink.lock().push(percent);
            })),
            on_success: Some(Arc::new(move |bytes: Bytes| {
                *payload_sink.lock() = Some(bytes);
            })),
            on_error: None,
        },
    );

    wait_until(|| {
        manager
            .get("s")
            .map(|s| s.status == TransferStatus::Completed)
            .unwrap_or(false)
    })
    .await;

    assert!(progress.lock().is_empty());
    assert_eq!(manager.get("s").unwrap().progress, 100);
    assert_eq!(payload.lock().as_ref().unwrap().len(), 16384);
}

/// A server error surfaces as a failed entry carrying the HTTP status, is
/// reported through the error hook, and is evicted on the longer delay.
#[tokio::test]
async fn test_http_failure_is_reported_and_evicted() {
    let mut server = mockito::Server::new_async().await;
    let _file = server
        .mock("GET", "/files/gone.pdf")
        .with_status(404)
        .expect_at_least(2) // streaming attempt, then the simple fallback
        .create_async()
        .await;

    let manager = DownloadManager::new(fast_config());
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors_sink = Arc::clone(&errors);

    manager.start(
        "gone",
        TransferTarget::new(format!("{}/files/gone.pdf", server.url()), "gone.pdf"),
        DownloadOptions {
            on_error: Some(Arc::new(move |e| {
                errors_sink.lock().push(e.to_string());
            })),
            ..Default::default()
        },
    );

    wait_until(|| {
        manager
            .get("gone")
            .map(|s| s.status == TransferStatus::Error)
            .unwrap_or(false)
    })
    .await;

    let state = manager.get("gone").unwrap();
    assert_eq!(state.error_message.as_deref(), Some("Server returned HTTP 404"));
    assert_eq!(errors.lock().as_slice(), ["Server returned HTTP 404"]);

    wait_until(|| manager.get("gone").is_none()).await;
}
