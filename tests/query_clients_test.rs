use anyhow::Result;
use httpmock::prelude::*;
use otelstack::core::ReqwestTransport;
use otelstack::{LogClient, MetricClient, PollSettings, Poller, StackError, TraceClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

fn fast_poller() -> Poller {
    Poller::new(
        Arc::new(ReqwestTransport::new()),
        PollSettings {
            interval: Duration::from_millis(20),
        },
    )
}

fn jaeger_body(traces: usize) -> serde_json::Value {
    let data: Vec<_> = (0..traces)
        .map(|i| {
            json!({
                "traceID": format!("trace-{}", i),
                "spans": [{
                    "traceID": format!("trace-{}", i),
                    "spanID": format!("span-{}", i),
                    "operationName": "GET /",
                    "references": [],
                    "startTime": 1_700_000_000_000_000i64,
                    "duration": 10,
                    "tags": [],
                    "logs": [],
                    "processID": "p1"
                }],
                "processes": {"p1": {"serviceName": "checkout", "tags": []}}
            })
        })
        .collect();
    json!({"data": data, "total": 0, "limit": 0, "offset": 0, "errors": null})
}

#[tokio::test]
async fn test_traces_found_on_first_attempt() -> Result<()> {
    let server = MockServer::start();
    let traces = server.mock(|when, then| {
        when.method(GET)
            .path("/api/traces")
            .query_param("service", "checkout")
            .query_param("limit", "2");
        then.status(200).json_body(jaeger_body(2));
    });

    let client = TraceClient::new(server.base_url(), fast_poller());
    let outcome = client.traces("checkout", 2, 5).await?;

    traces.assert_hits(1);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[0].spans[0].service_name.as_deref(), Some("checkout"));
    assert!(outcome.endpoint.contains("/api/traces?service=checkout&limit=2"));
    Ok(())
}

#[tokio::test]
async fn test_insufficient_traces_fail_after_every_attempt() {
    let server = MockServer::start();
    let traces = server.mock(|when, then| {
        when.method(GET).path("/api/traces");
        then.status(200).json_body(jaeger_body(2));
    });

    let client = TraceClient::new(server.base_url(), fast_poller());
    let err = assert_err!(client.traces("checkout", 5, 2).await);

    traces.assert_hits(2);
    match err {
        StackError::InsufficientResultsError {
            expected,
            found,
            attempts,
            endpoint,
        } => {
            assert_eq!((expected, found, attempts), (5, 2, 2));
            assert!(endpoint.starts_with(&server.base_url()));
        }
        other => panic!("expected insufficient results, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start();
    let events = server.mock(|when, then| {
        when.method(GET).path("/api/events");
        then.status(404);
    });

    let client = LogClient::new(server.base_url(), fast_poller());
    let err = assert_err!(client.events(1, 10).await);

    events.assert_hits(1);
    assert!(matches!(
        err,
        StackError::NonRetryableResponseError { status: 404, .. }
    ));
    assert!(err.endpoint().unwrap_or_default().ends_with("/api/events?count=1"));
}

#[tokio::test]
async fn test_too_many_requests_is_retried_until_exhausted() {
    let server = MockServer::start();
    let events = server.mock(|when, then| {
        when.method(GET).path("/api/events").query_param("count", "3");
        then.status(429);
    });

    let client = LogClient::new(server.base_url(), fast_poller());
    let err = assert_err!(client.events(3, 4).await);

    events.assert_hits(4);
    assert!(matches!(err, StackError::RetryableResponseError { status: 429, .. }));
}

#[tokio::test]
async fn test_events_are_returned() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/events");
        then.status(200).json_body(json!([
            {
                "Id": "event-1",
                "Timestamp": "2025-03-01T10:15:30.000Z",
                "Level": "Information",
                "MessageTemplateTokens": [{"Text": "payment accepted"}],
                "Properties": [{"Name": "Amount", "Value": 12.5}]
            }
        ]));
    });

    let client = LogClient::new(server.base_url(), fast_poller());
    let outcome = client.events(1, 3).await?;

    assert_eq!(outcome.records[0].message(), "payment accepted");
    assert_eq!(outcome.records[0].property("Amount"), Some(&json!(12.5)));
    Ok(())
}

#[tokio::test]
async fn test_garbage_body_aborts_with_decode_error() {
    let server = MockServer::start();
    let events = server.mock(|when, then| {
        when.method(GET).path("/api/events");
        then.status(200).body("<html>starting</html>");
    });

    let client = LogClient::new(server.base_url(), fast_poller());
    let err = assert_err!(client.events(1, 5).await);

    events.assert_hits(1);
    assert!(matches!(err, StackError::DecodeError { .. }));
}

#[tokio::test]
async fn test_metric_series_query() -> Result<()> {
    let server = MockServer::start();
    let range = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/query_range")
            .query_param("query", "requests_total{service_name=\"checkout\"}")
            .query_param("step", "10s")
            .query_param_exists("start")
            .query_param_exists("end");
        then.status(200).json_body(json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [{
                    "metric": {"__name__": "requests_total", "service_name": "checkout"},
                    "values": [[1740823200, "1"], [1740823210, "2"]]
                }]
            }
        }));
    });

    let client = MetricClient::new(server.base_url(), fast_poller());
    let outcome = client
        .series("requests_total", "checkout", Duration::from_secs(30), 2, 3)
        .await?;

    range.assert_hits(1);
    assert_eq!(outcome.records[0].samples.len(), 2);
    assert_eq!(outcome.records[0].name.as_deref(), Some("requests_total"));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_backend_is_a_transport_error() {
    let client = TraceClient::new("http://127.0.0.1:1", fast_poller());
    let err = assert_err!(client.traces("checkout", 1, 3).await);

    assert!(matches!(err, StackError::TransportError { .. }));
}
