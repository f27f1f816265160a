use comb_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn posts_json_and_decodes_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .and(body_json(json!({"action": "mouse:move", "args": {"x": 1, "y": 2}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let reply: Value = client
        .post_json_opts(
            "command",
            &json!({"action": "mouse:move", "args": {"x": 1, "y": 2}}),
            RequestOpts::default(),
        )
        .await
        .unwrap();
    assert_eq!(reply["ok"], json!(true));
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "warming up"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap().with_retries(1);
    let reply: Value = client
        .post_json_opts("command", &json!({}), RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));
}

#[tokio::test]
async fn client_errors_surface_message_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "unknown profile"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap().with_retries(3);
    let err = client
        .post_json_opts::<_, Value>("command", &json!({}), RequestOpts::default())
        .await
        .unwrap_err();
    match err {
        HttpError::Api { status, message } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message, "unknown profile");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_endpoint_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .post_json_opts::<_, Value>(
            "command",
            &json!({}),
            RequestOpts {
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
}

#[tokio::test]
async fn bearer_auth_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let _: Value = client
        .post_json_opts(
            "command",
            &json!({}),
            RequestOpts {
                auth: Some(Auth::Bearer(" secret-key ")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}
