//! Composite hand-off to an analysis gateway.
//!
//! Run: cargo test --test analysis_contract

use image::{Rgba, RgbaImage};
use snapstream_lib::analysis::{parse_response, AnalysisError, AnalysisGateway, AnalysisResult};
use snapstream_lib::config::SnapConfig;
use snapstream_lib::stitch::{stitch, CompositeImage};
use snapstream_lib::{export, Frame, FrameCollection, HttpGateway};
use std::sync::Mutex;

/// Replies with canned text and remembers what it was shown.
struct CannedGateway {
    reply: &'static str,
    seen: Mutex<Vec<String>>,
}

impl CannedGateway {
    fn new(reply: &'static str) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl AnalysisGateway for CannedGateway {
    async fn analyze(&self, composite: &CompositeImage) -> Result<AnalysisResult, AnalysisError> {
        self.seen.lock().unwrap().push(composite.digest().to_string());
        Ok(parse_response(self.reply))
    }
}

async fn composite() -> CompositeImage {
    let raster = RgbaImage::from_pixel(16, 8, Rgba([10, 20, 30, 255]));
    let frames = FrameCollection::new().append(Frame::from_raster(&raster).unwrap());
    stitch(&frames).await.unwrap().unwrap()
}

#[tokio::test]
async fn plain_text_reply_becomes_summary() {
    let gateway = CannedGateway::new("hello");
    let composite = composite().await;

    let result = gateway.analyze(&composite).await.unwrap();
    assert_eq!(result.summary.as_deref(), Some("hello"));
    assert!(result.text.is_none());
    assert!(result.code.is_none());
    assert_eq!(
        *gateway.seen.lock().unwrap(),
        vec![composite.digest().to_string()]
    );
}

#[tokio::test]
async fn fenced_json_reply_is_structured() {
    let gateway = CannedGateway::new(
        "```json\n{\"description\": \"A terminal\", \"code\": \"ls -la\"}\n```",
    );
    let result = gateway.analyze(&composite().await).await.unwrap();
    assert_eq!(result.summary.as_deref(), Some("A terminal"));
    assert_eq!(result.code.as_deref(), Some("ls -la"));
    assert!(result.text.is_none());
}

#[tokio::test]
async fn json_inside_prose_is_found() {
    let gateway =
        CannedGateway::new("Sure! Here you go: {\"summary\": \"s\", \"text\": \"t\"} Hope it helps.");
    let result = gateway.analyze(&composite().await).await.unwrap();
    assert_eq!(result.summary.as_deref(), Some("s"));
    assert_eq!(result.text.as_deref(), Some("t"));
}

#[tokio::test]
async fn http_gateway_without_key_is_refused_locally() {
    let config = SnapConfig::default();
    let gateway = HttpGateway::new(&config.analysis, None).unwrap();
    let err = gateway.analyze(&composite().await).await.unwrap_err();
    assert!(matches!(err, AnalysisError::MissingApiKey));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn export_wraps_composite_png() {
    let composite = composite().await;
    let url = export::to_data_url(&composite);
    assert!(url.starts_with("data:image/png;base64,"));
    assert_eq!(&url["data:image/png;base64,".len()..], export::to_base64(&composite));
}

/// Serves one canned HTTP response on a local port, then closes.
///
/// Returns the endpoint URL and a handle resolving to the raw request.
async fn one_shot_server(
    status: &'static str,
    content_type: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Read headers, then exactly Content-Length bytes of body.
        let mut request = Vec::new();
        let mut buf = [0u8; 8192];
        let header_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            request.extend_from_slice(&buf[..n]);
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while request.len() < header_end + content_length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{}/v1/messages", addr), server)
}

fn gateway_for(endpoint: String) -> HttpGateway {
    let mut config = SnapConfig::default();
    config.analysis.endpoint = endpoint;
    config.analysis.timeout_secs = 10;
    HttpGateway::new(&config.analysis, Some("test-key".to_string())).unwrap()
}

#[tokio::test]
async fn non_json_body_becomes_raw_summary() {
    let (endpoint, server) = one_shot_server("200 OK", "text/plain", "hello").await;
    let gateway = gateway_for(endpoint);

    let result = gateway.analyze(&composite().await).await.unwrap();
    assert_eq!(result.summary.as_deref(), Some("hello"));
    assert!(result.text.is_none());
    assert!(result.code.is_none());

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v1/messages"));
    assert!(request.to_lowercase().contains("x-api-key: test-key"));
}

#[tokio::test]
async fn messages_envelope_is_unwrapped() {
    let body = r#"{"content":[{"type":"text","text":"{\"summary\":\"a form\",\"code\":\"x = 1\"}"}]}"#;
    let (endpoint, server) = one_shot_server("200 OK", "application/json", body).await;
    let gateway = gateway_for(endpoint);

    let result = gateway.analyze(&composite().await).await.unwrap();
    assert_eq!(result.summary.as_deref(), Some("a form"));
    assert_eq!(result.code.as_deref(), Some("x = 1"));
    server.await.unwrap();
}

#[tokio::test]
async fn error_status_is_reported() {
    let (endpoint, server) =
        one_shot_server("503 Service Unavailable", "text/plain", "overloaded").await;
    let gateway = gateway_for(endpoint);

    let err = gateway.analyze(&composite().await).await.unwrap_err();
    match &err {
        AnalysisError::Status { code, body } => {
            assert_eq!(*code, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected a status error, got {:?}", other),
    }
    assert!(err.is_retryable());
    server.await.unwrap();
}
