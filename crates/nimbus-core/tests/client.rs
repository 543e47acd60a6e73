//! Integration tests for `WeatherApiClient` using wiremock HTTP mocks.

use std::time::Duration;

use nimbus_core::{Error, WeatherApi, WeatherApiClient};
use nimbus_types::fixtures;
use time::macros::date;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> WeatherApiClient {
    WeatherApiClient::with_timeout(base_url, "test-key", Duration::from_secs(2))
        .expect("client construction should not fail")
}

#[tokio::test]
async fn forecast_sends_expected_query_and_parses() {
    let server = MockServer::start().await;
    let body = fixtures::named_response("Oslo", &["2024-03-10", "2024-03-11"], true);

    Mock::given(method("GET"))
        .and(path("/v1/forecast.json"))
        .and(query_param("key", "test-key"))
        .and(query_param("q", "59.91,10.75"))
        .and(query_param("days", "2"))
        .and(query_param("aqi", "yes"))
        .and(query_param("alerts", "no"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client
        .fetch_forecast(&"59.91,10.75".into(), 2, true)
        .await
        .expect("forecast should parse");

    assert_eq!(response.location.name, "Oslo");
    assert!(response.current.is_some());
    assert_eq!(response.dates(), vec!["2024-03-10", "2024-03-11"]);
}

#[tokio::test]
async fn history_range_sends_end_date() {
    let server = MockServer::start().await;
    let body = fixtures::response(&["2024-03-01", "2024-03-02", "2024-03-03"], false);

    Mock::given(method("GET"))
        .and(path("/v1/history.json"))
        .and(query_param("q", "Delhi, India"))
        .and(query_param("dt", "2024-03-01"))
        .and(query_param("end_dt", "2024-03-03"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client
        .fetch_historical(
            &"Delhi, India".into(),
            date!(2024 - 03 - 01),
            Some(date!(2024 - 03 - 03)),
        )
        .await
        .expect("history should parse");

    assert_eq!(response.forecast.days.len(), 3);
    assert!(response.current.is_none());
}

#[tokio::test]
async fn history_single_day_omits_end_date() {
    let server = MockServer::start().await;
    let body = fixtures::response(&["2024-03-01"], false);

    Mock::given(method("GET"))
        .and(path("/v1/history.json"))
        .and(query_param("dt", "2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    client
        .fetch_historical(&"Delhi".into(), date!(2024 - 03 - 01), None)
        .await
        .expect("history should parse");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(
        !requests[0]
            .url
            .query_pairs()
            .any(|(k, _)| k == "end_dt")
    );
}

#[tokio::test]
async fn upstream_error_envelope_is_surfaced() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "error": { "code": 2009, "message": "API key does not have access to the resource." }
    });

    Mock::given(method("GET"))
        .and(path("/v1/history.json"))
        .respond_with(ResponseTemplate::new(403).set_body_json(&body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .fetch_historical(&"Delhi".into(), date!(2024 - 03 - 01), Some(date!(2024 - 03 - 05)))
        .await
        .unwrap_err();

    match err {
        Error::Upstream { status, message } => {
            assert_eq!(status, 403);
            assert!(message.contains("does not have access"));
            assert!(message.contains("2009"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert!(!Error::Upstream {
        status: 403,
        message: String::new()
    }
    .is_connectivity());
}

#[tokio::test]
async fn non_json_error_body_falls_back_to_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.fetch_forecast(&"Oslo".into(), 1, false).await.unwrap_err();
    assert!(matches!(err, Error::Upstream { status: 502, .. }));
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"location\":"))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.fetch_forecast(&"Oslo".into(), 1, false).await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn slow_server_times_out_as_connectivity() {
    let server = MockServer::start().await;
    let body = fixtures::response(&["2024-03-10"], true);

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&body)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = WeatherApiClient::with_timeout(&server.uri(), "k", Duration::from_millis(200))
        .expect("client construction should not fail");
    let err = client.fetch_forecast(&"Oslo".into(), 1, false).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn unreachable_host_is_connectivity() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = test_client(&uri);
    let err = client.fetch_forecast(&"Oslo".into(), 1, false).await.unwrap_err();
    assert!(err.is_connectivity());
}
