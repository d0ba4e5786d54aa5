use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::FetchClient;
use crate::error::ScrapeError;
use crate::retry::RetryPolicy;

fn client() -> FetchClient {
    FetchClient::new(
        5,
        "realagg-test/0.1",
        RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 0,
            cap_delay_secs: 0,
        },
    )
    .expect("client builds")
}

#[tokio::test]
async fn get_text_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let body = client()
        .get_text(&format!("{}/list", server.uri()))
        .await
        .expect("fetch succeeds");
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn transient_503_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let body = client()
        .get_text(&format!("{}/flaky", server.uri()))
        .await
        .expect("third attempt succeeds");
    assert_eq!(body, "recovered");
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client().get_text(&format!("{}/missing", server.uri())).await;
    assert!(matches!(result, Err(ScrapeError::NotFound { .. })));
}

#[tokio::test]
async fn forbidden_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/denied"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = client().get_text(&format!("{}/denied", server.uri())).await;
    assert!(
        matches!(result, Err(ScrapeError::UnexpectedStatus { status: 403, .. })),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn rate_limit_reads_retry_after_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let result = client().get_text(&format!("{}/limited", server.uri())).await;
    match result {
        Err(ScrapeError::RateLimited {
            retry_after_secs, ..
        }) => assert_eq!(retry_after_secs, 17),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn get_json_deserializes_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count": 3}"#))
        .mount(&server)
        .await;

    #[derive(serde::Deserialize)]
    struct Payload {
        count: u32,
    }

    let payload: Payload = client()
        .get_json(&format!("{}/api", server.uri()))
        .await
        .expect("json parses");
    assert_eq!(payload.count, 3);
}

#[tokio::test]
async fn invalid_json_is_a_deserialize_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let result: Result<serde_json::Value, _> =
        client().get_json(&format!("{}/api", server.uri())).await;
    assert!(matches!(result, Err(ScrapeError::Deserialize { .. })));
}

#[tokio::test]
async fn post_form_json_sends_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nabidky/ajax/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"count": 12, "html": "<div></div>"}"#),
        )
        .mount(&server)
        .await;

    #[derive(serde::Deserialize)]
    struct AjaxPage {
        count: u32,
        html: String,
    }

    let page: AjaxPage = client()
        .post_form_json(
            &format!("{}/nabidky/ajax/", server.uri()),
            &[("page", "1".to_string()), ("sold", "0".to_string())],
            &[("X-Requested-With", "XMLHttpRequest")],
        )
        .await
        .expect("ajax post succeeds");
    assert_eq!(page.count, 12);
    assert!(!page.html.is_empty());
}
