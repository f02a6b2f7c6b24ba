//! Backend layer integration tests
//!
//! Run entirely against the mock backend and unreachable endpoints, so no
//! inference runtime is needed.

use lmapp::backend::{
    recommend_kind, AssumeYes, BackendDetector, BackendError, BackendInstaller, BackendKind,
    BackendSelector, BackendStatus, ChatRequest, LLMBackend, MockBackend, OllamaBackend,
    RecoveryPolicy, SystemReport,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_mock_backend_contract() {
    let backend = MockBackend::new();
    assert!(backend.is_installed().await);

    let reply = backend
        .chat(&ChatRequest::new("hello", "mock-model"))
        .await
        .unwrap();
    assert!(reply.contains("hello"));

    assert!(backend.start().await);
    assert!(backend.is_running().await);
    assert_eq!(backend.get_info().await.status, BackendStatus::Running);

    assert!(backend.stop().await);
    assert!(!backend.is_running().await);
    assert_eq!(backend.get_info().await.status, BackendStatus::Installed);
}

#[test]
fn test_recommendation_policy() {
    assert_eq!(recommend_kind(false, 8.0), BackendKind::Ollama);
    assert_eq!(recommend_kind(false, 2.0), BackendKind::Llamafile);
    assert_eq!(recommend_kind(true, 1.0), BackendKind::Ollama);
}

#[tokio::test(start_paused = true)]
async fn test_retry_fails_twice_then_succeeds() {
    let calls = AtomicU32::new(0);
    let result = RecoveryPolicy::default()
        .run("flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BackendError::Connection {
                    message: "refused".to_string(),
                })
            } else {
                Ok("ok")
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();
    let result: Result<(), _> = RecoveryPolicy::default()
        .run("down", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Timeout { seconds: 1 })
        })
        .await;

    assert!(matches!(result, Err(BackendError::Timeout { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn test_unreachable_ollama_is_not_running() {
    let backend = OllamaBackend::with_options(
        "http://127.0.0.1:9",
        Duration::from_millis(200),
        RecoveryPolicy::no_retry(),
    );
    assert!(!backend.is_running().await);
    assert_eq!(backend.backend_name(), "ollama");
}

#[tokio::test]
async fn test_selector_requires_opt_in_for_mock() {
    let strict = BackendSelector::new(BackendDetector::new(Vec::new()));
    assert!(matches!(
        strict.select().await,
        Err(BackendError::Unavailable { .. })
    ));

    let lenient = BackendSelector::new(BackendDetector::new(Vec::new())).with_mock_fallback(true);
    let selected = lenient.select().await.unwrap();
    assert_eq!(selected.backend.backend_name(), "mock");
}

#[tokio::test]
async fn test_install_wizard_with_mock() {
    let detector = Arc::new(BackendDetector::new(vec![Arc::new(MockBackend::new())]));
    let installer = BackendInstaller::new(detector, Box::new(AssumeYes));

    let report = SystemReport {
        os_name: "Linux".to_string(),
        os_supported: true,
        total_ram_bytes: 4 * 1024 * 1024 * 1024,
        available_ram_bytes: 3 * 1024 * 1024 * 1024,
        free_disk_bytes: Some(100 * 1024 * 1024 * 1024),
        cpu_cores: 4,
    };

    let mut messages = Vec::new();
    let mut on_progress = |m: &str| messages.push(m.to_string());
    let outcome = installer
        .run_wizard(&report, Some("mock"), Some(&mut on_progress))
        .await
        .unwrap();

    assert_eq!(outcome.backend, "mock");
    assert_eq!(outcome.model.as_deref(), Some("phi3"));
    assert!(!messages.is_empty());
}
