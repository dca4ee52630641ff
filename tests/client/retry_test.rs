//! Retry, timeout and redaction behavior of `CompletionClient`.

use std::sync::Arc;
use std::time::Duration;

use psychguide::client::{
    ClientState, CompletionClient, CompletionResult, FailureKind, RetryPolicy,
};
use psychguide::providers::{CompletionRequest, ProviderError};

use crate::scripted_provider::{
    connection_refused, http_status, provider_config, ScriptedProvider, Step,
};

fn request() -> CompletionRequest {
    CompletionRequest {
        system_prompt: "persona".to_owned(),
        user_prompt: "Mental Health History: none".to_owned(),
        model: "claude-3-5-sonnet-20240620".to_owned(),
        max_tokens: 280,
        temperature: 0.7,
    }
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        request_timeout: Duration::from_secs(2),
        ..RetryPolicy::default()
    }
}

fn failure(result: &CompletionResult) -> &psychguide::client::CompletionFailure {
    match result {
        CompletionResult::Failure(failure) => failure,
        CompletionResult::Success(text) => panic!("expected failure, got success: {text}"),
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_up_to_budget_with_growing_delays() {
    let provider = Arc::new(ScriptedProvider::always(connection_refused, 10));
    let client = CompletionClient::new(provider.clone(), policy(4));

    let report = client
        .complete_with_report(&request(), &provider_config("key-1"))
        .await;

    assert_eq!(provider.calls(), 5);
    assert_eq!(report.attempts, 5);
    assert_eq!(report.delays.len(), 4);
    for pair in report.delays.windows(2) {
        assert!(pair[1] > pair[0], "delays must grow: {:?}", report.delays);
    }
    assert_eq!(report.final_state(), ClientState::Failed);
    assert_eq!(failure(&report.result).kind, FailureKind::Transient);
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_transient() {
    let provider = Arc::new(ScriptedProvider::always(
        || http_status(503, "overloaded"),
        10,
    ));
    let client = CompletionClient::new(provider.clone(), policy(2));

    let result = client.complete(&request(), &provider_config("key-1")).await;

    assert_eq!(provider.calls(), 3);
    let failure = failure(&result);
    assert_eq!(failure.kind, FailureKind::Transient);
    assert_eq!(failure.status, Some(503));
}

#[tokio::test(start_paused = true)]
async fn zero_retry_budget_makes_a_single_attempt() {
    let provider = Arc::new(ScriptedProvider::always(connection_refused, 10));
    let client = CompletionClient::new(provider.clone(), policy(0));

    let report = client
        .complete_with_report(&request(), &provider_config("key-1"))
        .await;

    assert_eq!(provider.calls(), 1);
    assert!(report.delays.is_empty());
}

#[tokio::test(start_paused = true)]
async fn authentication_rejection_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::always(
        || http_status(401, "invalid x-api-key"),
        10,
    ));
    let client = CompletionClient::new(provider.clone(), policy(3));

    let report = client
        .complete_with_report(&request(), &provider_config("key-1"))
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(
        report.transitions,
        vec![ClientState::Idle, ClientState::Sending, ClientState::Failed]
    );
    let failure = failure(&report.result);
    assert_eq!(failure.kind, FailureKind::Rejected);
    assert!(!failure.is_rate_limited());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_is_retried_exactly_once() {
    let provider = Arc::new(ScriptedProvider::always(
        || http_status(429, "rate limited"),
        10,
    ));
    let client = CompletionClient::new(provider.clone(), policy(3));

    let report = client
        .complete_with_report(&request(), &provider_config("key-1"))
        .await;

    assert_eq!(provider.calls(), 2);
    assert_eq!(report.delays.len(), 1);
    let failure = failure(&report.result);
    assert_eq!(failure.kind, FailureKind::Rejected);
    assert!(failure.is_rate_limited());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_retry_still_counts_against_budget() {
    let provider = Arc::new(ScriptedProvider::always(
        || http_status(429, "rate limited"),
        10,
    ));
    let client = CompletionClient::new(provider.clone(), policy(0));

    client.complete(&request(), &provider_config("key-1")).await;

    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_response_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Fail(ProviderError::EmptyResponse),
        Step::Reply("never reached".to_owned()),
    ]));
    let client = CompletionClient::new(provider.clone(), policy(3));

    let result = client.complete(&request(), &provider_config("key-1")).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(failure(&result).kind, FailureKind::Malformed);
}

#[tokio::test(start_paused = true)]
async fn success_after_transient_failure_records_path() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Fail(connection_refused()),
        Step::Reply("Plan: rest".to_owned()),
    ]));
    let client = CompletionClient::new(provider.clone(), policy(2));

    let report = client
        .complete_with_report(&request(), &provider_config("key-1"))
        .await;

    assert_eq!(report.result, CompletionResult::Success("Plan: rest".to_owned()));
    assert_eq!(report.attempts, 2);
    assert_eq!(
        report.transitions,
        vec![
            ClientState::Idle,
            ClientState::Sending,
            ClientState::Retrying,
            ClientState::Sending,
            ClientState::Success,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn hung_attempt_times_out_as_transient() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Hang, Step::Hang]));
    let client = CompletionClient::new(provider.clone(), policy(1));

    let started = tokio::time::Instant::now();
    let result = client.complete(&request(), &provider_config("key-1")).await;

    assert_eq!(provider.calls(), 2);
    let failure = failure(&result);
    assert_eq!(failure.kind, FailureKind::Transient);
    assert!(failure.detail.contains("did not respond"));
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn api_key_never_appears_in_failure_detail() {
    let key = "plain-secret-key-0123";
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Fail(http_status(
        401,
        &format!("key {key} is not valid"),
    ))]));
    let client = CompletionClient::new(provider.clone(), policy(0));

    let result = client.complete(&request(), &provider_config(key)).await;

    let failure = failure(&result);
    assert!(!failure.detail.contains(key));
    assert!(failure.detail.contains("[REDACTED]"));
    assert_eq!(provider.keys(), vec![key.to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_call_stops_further_attempts() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Hang]));
    let client = CompletionClient::new(provider.clone(), policy(3));
    let config = provider_config("key-1");
    let request = request();

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        client.complete(&request, &config),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(provider.calls(), 1);
}
