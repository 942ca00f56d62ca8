use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use onebun_http::prelude::{
    Backoff, HttpClient, MetricsSink, RequestError, RequestObservation, RetryHook, RetryPolicy,
};

#[derive(Clone)]
struct MockResponse {
    status: u16,
    body: Vec<u8>,
}

impl MockResponse {
    fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into().into_bytes(),
        }
    }
}

struct MockServer {
    base_url: String,
    served: Arc<AtomicUsize>,
    join: Option<JoinHandle<()>>,
}

impl MockServer {
    fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let address = listener.local_addr().expect("read local address");
        listener
            .set_nonblocking(true)
            .expect("set listener nonblocking");

        let served = Arc::new(AtomicUsize::new(0));
        let served_clone = Arc::clone(&served);

        let join = thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            let mut response_index = 0;

            while response_index < responses.len() && std::time::Instant::now() < deadline {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let _ = drain_request(&mut stream);
                        served_clone.fetch_add(1, Ordering::SeqCst);
                        let response = &responses[response_index];
                        response_index += 1;
                        let _ = write_response(&mut stream, response);
                    }
                    Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{address}"),
            served,
            join: Some(join),
        }
    }

    fn served_count(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn drain_request(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut raw = Vec::new();
    loop {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
        if find_header_end(&raw).is_some() {
            break;
        }
    }
    Ok(())
}

fn write_response(stream: &mut TcpStream, response: &MockResponse) -> std::io::Result<()> {
    let mut raw = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len()
    )
    .into_bytes();
    raw.extend_from_slice(&response.body);
    stream.write_all(&raw)?;
    stream.flush()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::disabled()
        .delay(Duration::from_millis(10))
        .backoff(Backoff::Fixed)
}

fn client_for(server: &MockServer, policy: RetryPolicy) -> HttpClient {
    HttpClient::builder()
        .base_url(server.base_url.clone())
        .timeout(Duration::from_secs(2))
        .retry_policy(policy)
        .try_build()
        .expect("build client")
}

#[derive(Default)]
struct RecordingSink {
    observations: Mutex<Vec<RequestObservation>>,
}

impl MetricsSink for RecordingSink {
    fn record(
        &self,
        observation: &RequestObservation,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.observations
            .lock()
            .expect("lock observations")
            .push(observation.clone());
        Ok(())
    }
}

#[derive(Default)]
struct CountingHook {
    attempts: Mutex<Vec<u32>>,
}

impl RetryHook for CountingHook {
    fn on_retry(
        &self,
        _error: &RequestError,
        attempt: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempts.lock().expect("lock attempts").push(attempt);
        Ok(())
    }
}

struct FailingHook;

impl RetryHook for FailingHook {
    fn on_retry(
        &self,
        _error: &RequestError,
        _attempt: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("hook exploded".into())
    }
}

#[tokio::test]
async fn retryable_status_is_retried_once_then_succeeds() {
    let server = MockServer::start(vec![
        MockResponse::json(503, "{}"),
        MockResponse::json(200, r#"{"ok":true}"#),
    ]);
    let policy = fast_policy().max(1).retry_on([503]);
    let client = client_for(&server, policy);

    let response = client
        .get("/v1/items")
        .send()
        .await
        .expect("second attempt should win");

    assert_eq!(response.retry_count, 1);
    assert_eq!(server.served_count(), 2);
}

#[tokio::test]
async fn exhausted_budget_returns_the_second_attempts_outcome() {
    let server = MockServer::start(vec![
        MockResponse::json(503, "{}"),
        MockResponse::json(503, r#"{"still":"down"}"#),
    ]);
    let policy = fast_policy().max(1).retry_on([503]);
    let client = client_for(&server, policy);

    let error = client
        .get("/v1/items")
        .send()
        .await
        .expect_err("both attempts fail");

    assert_eq!(error.code(), "HTTP_ERROR");
    assert_eq!(error.status_code(), Some(503));
    assert_eq!(server.served_count(), 2);
}

#[tokio::test]
async fn non_member_status_is_never_retried() {
    let server = MockServer::start(vec![MockResponse::json(404, "{}")]);
    let policy = fast_policy().max(3).retry_on([500, 502, 503, 504]);
    let client = client_for(&server, policy);

    let error = client
        .get("/v1/items/9")
        .send()
        .await
        .expect_err("404 should fail");

    assert_eq!(error.status_code(), Some(404));
    assert_eq!(server.served_count(), 1);
}

#[tokio::test]
async fn empty_retry_on_never_retries_even_transient_statuses() {
    let server = MockServer::start(vec![MockResponse::json(503, "{}")]);
    let policy = fast_policy().max(3);
    let client = client_for(&server, policy);

    let error = client
        .get("/v1/items")
        .send()
        .await
        .expect_err("503 should fail");

    assert_eq!(error.status_code(), Some(503));
    assert_eq!(server.served_count(), 1);
}

#[tokio::test]
async fn retry_hook_sees_one_based_attempt_numbers() {
    let server = MockServer::start(vec![
        MockResponse::json(503, "{}"),
        MockResponse::json(503, "{}"),
        MockResponse::json(200, "{}"),
    ]);
    let hook = Arc::new(CountingHook::default());
    let policy = fast_policy()
        .max(2)
        .retry_on([503])
        .on_retry(hook.clone());
    let client = client_for(&server, policy);

    let response = client
        .get("/v1/items")
        .send()
        .await
        .expect("third attempt should win");

    assert_eq!(response.retry_count, 2);
    assert_eq!(*hook.attempts.lock().expect("lock attempts"), vec![1, 2]);
}

#[tokio::test]
async fn failing_retry_hook_aborts_without_another_send() {
    let server = MockServer::start(vec![MockResponse::json(503, "{}")]);
    let policy = fast_policy()
        .max(3)
        .retry_on([503])
        .on_retry(Arc::new(FailingHook));
    let client = client_for(&server, policy);

    let error = client
        .get("/v1/items")
        .send()
        .await
        .expect_err("hook failure should reject");

    assert_eq!(error.code(), "RETRY_CALLBACK_ERROR");
    match error {
        RequestError::RetryCallback { attempt, cause, .. } => {
            assert_eq!(attempt, 1);
            assert_eq!(cause.code(), "HTTP_ERROR");
        }
        other => panic!("unexpected error variant: {other}"),
    }
    // Give any stray retry a chance to hit the server before asserting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.served_count(), 1);
}

#[tokio::test]
async fn metrics_sink_records_one_observation_per_attempt() {
    let server = MockServer::start(vec![
        MockResponse::json(503, "{}"),
        MockResponse::json(200, "{}"),
    ]);
    let sink = Arc::new(RecordingSink::default());
    let policy = fast_policy().max(1).retry_on([503]);
    let client = HttpClient::builder()
        .base_url(server.base_url.clone())
        .retry_policy(policy)
        .metrics_sink(sink.clone())
        .try_build()
        .expect("build client");

    client
        .get("/v1/items")
        .send()
        .await
        .expect("second attempt should win");

    let observations = sink.observations.lock().expect("lock observations");
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].status_code, Some(503));
    assert!(!observations[0].success);
    assert_eq!(observations[0].retry_count, 0);
    assert_eq!(observations[1].status_code, Some(200));
    assert!(observations[1].success);
    assert_eq!(observations[1].retry_count, 1);
}

#[tokio::test]
async fn metrics_can_be_disabled_per_call() {
    let server = MockServer::start(vec![MockResponse::json(200, "{}")]);
    let sink = Arc::new(RecordingSink::default());
    let client = HttpClient::builder()
        .base_url(server.base_url.clone())
        .metrics_sink(sink.clone())
        .try_build()
        .expect("build client");

    client
        .get("/v1/items")
        .metrics(false)
        .send()
        .await
        .expect("request should succeed");

    assert!(sink.observations.lock().expect("lock observations").is_empty());
}

#[tokio::test]
async fn connection_refused_is_a_fetch_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    let address = listener.local_addr().expect("read local address");
    drop(listener);

    let client = HttpClient::builder()
        .base_url(format!("http://{address}"))
        .timeout(Duration::from_secs(1))
        .retry_policy(fast_policy().max(1).retry_on_transport(true))
        .try_build()
        .expect("build client");

    let error = client
        .get("/v1/items")
        .send()
        .await
        .expect_err("closed port should fail");
    assert_eq!(error.code(), "FETCH_ERROR");
}

#[tokio::test]
async fn per_call_policy_overrides_the_client_default() {
    let server = MockServer::start(vec![
        MockResponse::json(503, "{}"),
        MockResponse::json(200, "{}"),
    ]);
    let client = client_for(&server, RetryPolicy::disabled());

    let response = client
        .get("/v1/items")
        .retry_policy(fast_policy().max(1).retry_on([503]))
        .send()
        .await
        .expect("per-call policy should retry");

    assert_eq!(response.retry_count, 1);
    assert_eq!(server.served_count(), 2);
}
