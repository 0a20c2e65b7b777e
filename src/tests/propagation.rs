use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::tests::test_support::{INVALID_BODY, harness, initial_state};
use crate::{Error, ErrorKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn refresh_never_called(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn invalid_access_token_is_not_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots"))
        .respond_with(ResponseTemplate::new(401).set_body_string(INVALID_BODY))
        .expect(1)
        .mount(&server)
        .await;
    refresh_never_called(&server).await;

    let h = harness(&server, initial_state());
    let uri = server.uri();
    let err = h
        .middleware
        .execute(|c| c.get(format!("{uri}/robots")))
        .await
        .expect_err("invalid token surfaces");

    match err {
        Error::InvalidAccessToken(api) => {
            assert_eq!(api.status.as_u16(), 401);
            assert_eq!(api.errors[0].message.as_deref(), Some("Invalid access token"));
        }
        other => panic!("expected Error::InvalidAccessToken, got {}", other),
    }
}

#[tokio::test]
async fn rate_limit_is_propagated_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robots"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;
    refresh_never_called(&server).await;

    let h = harness(&server, initial_state());
    let uri = server.uri();
    let err = h
        .middleware
        .execute(|c| c.post(format!("{uri}/robots")).json(&serde_json::json!({ "name": "r2" })))
        .await
        .expect_err("429 surfaces");

    assert!(matches!(
        err,
        Error::Api {
            kind: ErrorKind::RateLimited,
            ..
        }
    ));
    assert_eq!(err.api_error().unwrap().body, "slow down");
}

#[tokio::test]
async fn plain_not_found_keeps_server_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots/7"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "errors": [{ "code": "error.robot.not_found", "message": "Robot not found" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    refresh_never_called(&server).await;

    let h = harness(&server, initial_state());
    let uri = server.uri();
    let err = h
        .middleware
        .execute(|c| c.get(format!("{uri}/robots/7")))
        .await
        .expect_err("404 surfaces");

    match err {
        Error::Api {
            kind: ErrorKind::NotFound,
            error,
        } => assert_eq!(error.errors[0].code.as_deref(), Some("error.robot.not_found")),
        other => panic!("expected not found, got {}", other),
    }
    assert!(!h.locker.is_held());
}

#[tokio::test]
async fn truncated_error_body_is_not_classified() {
    let server = MockServer::start().await;
    refresh_never_called(&server).await;

    // Announces more body than it sends, then hangs up.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(
                b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 200\r\n\r\n{\"errors\":[{\"code\":\"token_",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let h = harness(&server, initial_state());
    let err = h
        .middleware
        .execute(|c| c.get(format!("http://{addr}/robots")))
        .await
        .expect_err("body was cut short");

    assert!(matches!(err, Error::Http(_)), "got {err}");
    assert!(!h.locker.is_held());
}
