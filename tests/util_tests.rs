//! Retry, timeout and truncation as the round fallback uses them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use common::{MockProvider, RecordingTransport, Reply};
use parley::prelude::*;
use parley::util::timeout::with_timeout;
use parley::util::truncate::{cap_text, char_boundary, TRUNCATION_MARKER};

fn engine_with(config: EngineConfig, provider: &Arc<MockProvider>) -> (Engine, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let engine = Engine::new(config, provider.clone(), transport.clone());
    (engine, transport)
}

#[tokio::test(start_paused = true)]
async fn overloaded_fallback_backs_off_between_attempts() {
    let provider = Arc::new(
        MockProvider::sequence(vec![Reply::Fail(529)]).with_generate(|n| {
            if n < 2 {
                Reply::Fail(529)
            } else {
                Reply::Text("recovered".into())
            }
        }),
    );
    let (engine, transport) = engine_with(EngineConfig::default(), &provider);

    let started = Instant::now();
    let result = engine.process(1, "still there?").await;
    let waited = started.elapsed();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(provider.generate_count(), 3);
    assert_eq!(transport.messages(), vec!["recovered".to_string()]);
    // 1s then 2s of backoff, each jittered by 25%.
    assert!(waited >= Duration::from_millis(2_250), "{waited:?}");
    assert!(waited <= Duration::from_millis(3_750), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_hint_outlasts_the_backoff() {
    let provider = Arc::new(
        MockProvider::sequence(vec![Reply::RateLimited(Some(20_000))]).with_generate(|n| {
            if n == 0 {
                Reply::RateLimited(Some(20_000))
            } else {
                Reply::Text("thanks for waiting".into())
            }
        }),
    );
    let (engine, transport) = engine_with(EngineConfig::default(), &provider);

    let started = Instant::now();
    let result = engine.process(1, "hello").await;
    let waited = started.elapsed();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(provider.generate_count(), 2);
    assert_eq!(transport.messages(), vec!["thanks for waiting".to_string()]);
    assert!(waited >= Duration::from_secs(20), "{waited:?}");
    assert!(waited < Duration::from_secs(21), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn single_attempt_budget_never_repeats_the_fallback() {
    let provider = Arc::new(MockProvider::sequence(vec![Reply::Fail(503)]));
    let config = EngineConfig {
        retry_attempts: 1,
        ..EngineConfig::default()
    };
    let (engine, transport) = engine_with(config, &provider);

    let started = Instant::now();
    let result = engine.process(1, "hello").await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(provider.generate_count(), 1);
    assert!(started.elapsed() < Duration::from_millis(750));
    assert!(transport.messages()[0].contains("having trouble"));
}

#[tokio::test(start_paused = true)]
async fn provider_timeout_becomes_a_retryable_timeout() {
    let config = EngineConfig {
        provider_timeout_ms: 250,
        ..EngineConfig::default()
    };
    let result = with_timeout(config.provider_timeout(), async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, EngineError>(())
    })
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(250)));
    assert!(err.is_retryable());
}

#[test]
fn capped_tool_output_keeps_whole_characters() {
    let output = "ü".repeat(30);
    let capped = cap_text(output, 10);

    assert_eq!(capped, format!("{}{TRUNCATION_MARKER}", "ü".repeat(10)));
    assert_eq!(cap_text(capped.clone(), 10), capped);
    assert_eq!(char_boundary("üü", 1), Some("ü".len()));
}
