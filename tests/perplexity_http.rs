//! Perplexity search client against a local HTTP server.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;

use grantbuddy::error::SearchError;
use grantbuddy::llm::{PerplexitySearch, WebSearch};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve exactly one response; the raw request is sent back on the channel.
async fn serve_once(response: String) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
    });

    (format!("http://127.0.0.1:{port}/chat/completions"), rx)
}

fn request_complete(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    buf.len() >= header_end + 4 + content_length
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn search(endpoint: &str) -> PerplexitySearch {
    PerplexitySearch::new("pplx-test".to_string().into(), Duration::from_secs(2))
        .unwrap()
        .with_endpoint(endpoint)
}

#[tokio::test]
async fn answer_and_request_shape() {
    timeout(TEST_TIMEOUT, async {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"The Malala Fund accepts proposals in March."}}]}"#;
        let (url, request) = serve_once(http_response("200 OK", body)).await;

        let answer = search(&url).search("girls education grants").await.unwrap();
        assert_eq!(answer, "The Malala Fund accepts proposals in March.");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer pplx-test"));
        assert!(request.contains(r#""model":"llama-3.1-sonar-small-128k-online""#));
        assert!(request.contains(r#""content":"Search the web for: girls education grants""#));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn error_status_is_request_failed() {
    timeout(TEST_TIMEOUT, async {
        let body = r#"{"error":{"message":"Invalid API key","type":"invalid_api_key"}}"#;
        let (url, _request) = serve_once(http_response("401 Unauthorized", body)).await;

        match search(&url).search("STEM grants").await {
            Err(SearchError::RequestFailed(detail)) => {
                assert!(detail.contains("401"));
                assert!(detail.contains("Invalid API key"));
            }
            other => panic!("expected RequestFailed, got {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_choices_is_invalid_response() {
    timeout(TEST_TIMEOUT, async {
        let (url, _request) = serve_once(http_response("200 OK", r#"{"choices":[]}"#)).await;

        let err = search(&url).search("STEM grants").await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidResponse(_)));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    timeout(TEST_TIMEOUT, async {
        let (url, _request) = serve_once(http_response("200 OK", "not json")).await;

        let err = search(&url).search("STEM grants").await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidResponse(_)));
    })
    .await
    .expect("test timed out");
}
