mod common;

use bridge_traits::http::HttpRequest;
use bridge_traits::network::ConnectivitySignal;
use bridge_traits::time::ManualClock;
use common::{ManualConnectivity, Reply, ScriptedHttpClient};
use core_offline::{
    BackoffPolicy, ConnectivityFailure, DrainReport, NetworkMonitor, QueueConfig, RequestError,
    RequestOutcome, RequestQueue,
};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    http: Arc<ScriptedHttpClient>,
    monitor: Arc<NetworkMonitor>,
    queue: Arc<RequestQueue>,
}

fn harness(online: bool, http: ScriptedHttpClient, config: QueueConfig) -> Harness {
    let source = if online {
        ManualConnectivity::online()
    } else {
        ManualConnectivity::offline()
    };
    let http = Arc::new(http);
    let monitor = Arc::new(NetworkMonitor::new(Arc::new(source)));
    let queue = Arc::new(RequestQueue::new(http.clone(), monitor.clone(), config).unwrap());
    Harness {
        http,
        monitor,
        queue,
    }
}

fn queued(outcome: RequestOutcome) -> core_offline::QueueTicket {
    match outcome {
        RequestOutcome::Queued(ticket) => ticket,
        RequestOutcome::Completed(response) => {
            panic!("expected queued outcome, got HTTP {}", response.status)
        }
    }
}

#[tokio::test]
async fn offline_request_dispatched_once_after_reconnect() {
    let h = harness(
        false,
        ScriptedHttpClient::new(Reply::Status(200, "ok")),
        QueueConfig::default(),
    );
    let cancel = CancellationToken::new();
    let worker = h.queue.start(cancel.clone());

    let ticket = queued(
        h.queue
            .request(HttpRequest::get("https://api.test/a"))
            .await
            .unwrap(),
    );
    assert_eq!(h.http.call_count(), 0);

    h.monitor
        .handle_signal(&ConnectivitySignal::new(true, "wifi"));

    let response = tokio::time::timeout(Duration::from_secs(5), ticket.wait())
        .await
        .expect("ticket resolved")
        .unwrap();
    assert_eq!(response.status, 200);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.http.call_count(), 1);
    assert!(h.queue.is_empty());

    cancel.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn offline_request_is_not_dispatched_before_transition() {
    let h = harness(
        false,
        ScriptedHttpClient::new(Reply::Status(200, "ok")),
        QueueConfig::default(),
    );
    h.queue
        .request(HttpRequest::get("https://api.test/a"))
        .await
        .unwrap();

    assert_eq!(h.queue.drain().await, DrainReport::default());
    assert_eq!(h.queue.drain_ready().await, DrainReport::default());
    assert_eq!(h.http.call_count(), 0);
    assert_eq!(h.queue.len(), 1);
}

#[tokio::test]
async fn three_timeouts_with_two_retries_fail_once() {
    let h = harness(
        true,
        ScriptedHttpClient::new(Reply::Timeout),
        QueueConfig::new().with_max_retries(2),
    );

    let ticket = queued(
        h.queue
            .request(HttpRequest::post("https://api.test/b"))
            .await
            .unwrap(),
    );
    assert_eq!(h.queue.snapshot()[0].retry_count, 1);

    let second = h.queue.drain().await;
    assert_eq!(second.requeued, 1);
    assert_eq!(h.queue.snapshot()[0].retry_count, 2);

    let third = h.queue.drain().await;
    assert_eq!(third.dropped, 1);
    assert!(h.queue.is_empty());

    assert_eq!(
        ticket.wait().await,
        Err(RequestError::RetriesExhausted {
            attempts: 3,
            last_failure: ConnectivityFailure::Timeout,
        })
    );
    assert_eq!(h.http.call_count(), 3);
    assert_eq!(h.queue.stats().dropped, 1);
}

#[tokio::test]
async fn application_error_is_never_queued() {
    let h = harness(
        true,
        ScriptedHttpClient::new(Reply::Status(404, "missing")),
        QueueConfig::default(),
    );

    let err = h
        .queue
        .request(HttpRequest::get("https://api.test/unknown"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RequestError::Application {
            status: 404,
            body: "missing".to_string(),
        }
    );
    assert!(h.queue.is_empty());
    assert_eq!(h.queue.drain().await, DrainReport::default());
    assert_eq!(h.http.call_count(), 1);
}

#[tokio::test]
async fn application_error_during_drain_fails_without_retry() {
    let h = harness(
        false,
        ScriptedHttpClient::new(Reply::Status(500, "boom")),
        QueueConfig::default(),
    );
    let ticket = queued(
        h.queue
            .request(HttpRequest::get("https://api.test/a"))
            .await
            .unwrap(),
    );
    h.monitor
        .handle_signal(&ConnectivitySignal::new(true, "4g"));

    let report = h.queue.drain().await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.application_failures, 1);
    assert!(h.queue.is_empty());
    assert_eq!(ticket.wait().await.unwrap_err().status(), Some(500));
}

#[tokio::test]
async fn drain_pass_preserves_enqueue_order() {
    let h = harness(
        false,
        ScriptedHttpClient::new(Reply::Status(200, "ok")),
        QueueConfig::default(),
    );
    for path in ["a", "b", "c"] {
        h.queue
            .request(HttpRequest::get(format!("https://api.test/{path}")))
            .await
            .unwrap();
    }
    h.monitor
        .handle_signal(&ConnectivitySignal::new(true, "wifi"));

    let report = h.queue.drain().await;
    assert_eq!(report.succeeded, 3);
    assert_eq!(
        h.http.calls(),
        vec![
            "https://api.test/a",
            "https://api.test/b",
            "https://api.test/c"
        ]
    );
}

#[tokio::test]
async fn requeued_items_keep_their_place() {
    let http = ScriptedHttpClient::new(Reply::Status(200, "ok"))
        .then(Reply::Refused)
        .then(Reply::Timeout);
    let h = harness(false, http, QueueConfig::default());
    for path in ["a", "b", "c"] {
        h.queue
            .request(HttpRequest::get(format!("https://api.test/{path}")))
            .await
            .unwrap();
    }
    h.monitor
        .handle_signal(&ConnectivitySignal::new(true, "wifi"));

    let report = h.queue.drain().await;
    assert_eq!(report.requeued, 2);
    assert_eq!(report.succeeded, 1);

    let urls: Vec<String> = h.queue.snapshot().into_iter().map(|s| s.url).collect();
    assert_eq!(urls, vec!["https://api.test/a", "https://api.test/b"]);
    assert!(h.queue.snapshot().iter().all(|item| item.retry_count == 1));
}

#[tokio::test]
async fn queue_full_is_reported() {
    let h = harness(
        false,
        ScriptedHttpClient::new(Reply::Status(200, "ok")),
        QueueConfig::new().with_max_queue_len(1),
    );
    h.queue
        .request(HttpRequest::get("https://api.test/a"))
        .await
        .unwrap();

    let err = h
        .queue
        .request(HttpRequest::get("https://api.test/b"))
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::QueueFull { limit: 1 });
}

#[tokio::test]
async fn clear_queue_abandons_without_dispatch() {
    let h = harness(
        false,
        ScriptedHttpClient::new(Reply::Status(200, "ok")),
        QueueConfig::default(),
    );
    let first = queued(
        h.queue
            .request(HttpRequest::get("https://api.test/a"))
            .await
            .unwrap(),
    );
    let second = queued(
        h.queue
            .request(HttpRequest::get("https://api.test/b"))
            .await
            .unwrap(),
    );

    assert_eq!(h.queue.clear_queue(), 2);
    h.monitor
        .handle_signal(&ConnectivitySignal::new(true, "wifi"));
    assert_eq!(h.queue.drain().await.attempted, 0);

    assert_eq!(first.wait().await, Err(RequestError::Abandoned));
    assert_eq!(second.wait().await, Err(RequestError::Abandoned));
    assert_eq!(h.http.call_count(), 0);
    assert_eq!(h.queue.stats().abandoned, 2);
}

#[tokio::test(start_paused = true)]
async fn periodic_pass_retries_after_backoff() {
    let clock = ManualClock::default();
    let source = ManualConnectivity::online();
    let http = Arc::new(ScriptedHttpClient::new(Reply::Status(200, "ok")).then(Reply::Timeout));
    let monitor = Arc::new(NetworkMonitor::new(Arc::new(source)));
    let queue = Arc::new(
        RequestQueue::new(
            http.clone(),
            monitor,
            QueueConfig::new()
                .with_drain_interval(Duration::from_secs(1))
                .with_backoff(BackoffPolicy {
                    base_delay: Duration::from_secs(2),
                    ..BackoffPolicy::default()
                }),
        )
        .unwrap()
        .with_clock(Arc::new(clock.clone())),
    );
    let cancel = CancellationToken::new();
    let worker = queue.start(cancel.clone());

    let ticket = queued(
        queue
            .request(HttpRequest::get("https://api.test/a"))
            .await
            .unwrap(),
    );

    // First periodic pass: backoff not yet elapsed.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(http.call_count(), 1);

    clock.advance(Duration::from_secs(2));
    let response = ticket.wait().await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(http.call_count(), 2);

    cancel.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn lifecycle_is_published() {
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let http = Arc::new(ScriptedHttpClient::new(Reply::Status(201, "created")));
    let monitor = Arc::new(NetworkMonitor::new(Arc::new(ManualConnectivity::offline())));
    let queue = RequestQueue::new(http, monitor.clone(), QueueConfig::default())
        .unwrap()
        .with_event_bus(bus);

    let ticket = queued(
        queue
            .request(HttpRequest::post("https://api.test/reports"))
            .await
            .unwrap(),
    );
    let id = ticket.id().to_string();
    monitor.handle_signal(&ConnectivitySignal::new(true, "wifi"));
    queue.drain().await;

    let mut seen = Vec::new();
    while let Ok(CoreEvent::Queue(event)) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            QueueEvent::Enqueued {
                request_id: id.clone(),
                url: "https://api.test/reports".to_string(),
                reason: "offline".to_string(),
            },
            QueueEvent::Dispatched {
                request_id: id.clone(),
                attempt: 1,
            },
            QueueEvent::Completed {
                request_id: id,
                status: 201,
            },
            QueueEvent::DrainFinished {
                attempted: 1,
                succeeded: 1,
                requeued: 0,
                dropped: 0,
            },
        ]
    );
}
