use fluxgen::{
    AspectRatio, FluxConfig, FluxError, FluxImageClient, GenerationRequest, GenerationResult,
    ImageApi, ImageFormat, PromptSubmitter, Quality,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct Reply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Reply {
    fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    head: String,
    body: String,
}

type Handler = Arc<dyn Fn(&Seen, &str) -> Reply + Send + Sync>;

/// Minimal HTTP/1.1 server answering one request per connection.
struct FakeFlux {
    base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FakeFlux {
    async fn start(handler: impl Fn(&Seen, &str) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let server_base = base.clone();
        let server_seen = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let seen = server_seen.clone();
                let base = server_base.clone();
                tokio::spawn(async move {
                    if let Some(request) = read_request(&mut stream).await {
                        let reply = handler(&request, &base);
                        seen.lock().unwrap().push(request);
                        write_reply(&mut stream, reply).await;
                    }
                });
            }
        });

        Self { base, seen }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<Seen> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    Some(Seen {
        method,
        path,
        head: head.to_ascii_lowercase(),
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    })
}

async fn write_reply(stream: &mut TcpStream, reply: Reply) {
    let head = format!(
        "HTTP/1.1 {} Scripted\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&reply.body).await;
    let _ = stream.shutdown().await;
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 90, 160]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn client_for(server: &FakeFlux, max_poll_attempts: u32) -> FluxImageClient {
    let config = flux_config(server, max_poll_attempts);
    FluxImageClient::new(&config).unwrap()
}

fn flux_config(server: &FakeFlux, max_poll_attempts: u32) -> FluxConfig {
    FluxConfig::new()
        .with_api_key("test-key")
        .with_base_url(server.url("/v1/flux-pro-1.1-ultra"))
        .with_polling(Duration::from_millis(10), max_poll_attempts)
        .with_request_timeout(Duration::from_secs(5))
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new(prompt, AspectRatio::Widescreen, Quality::High).unwrap()
}

#[tokio::test]
async fn test_submit_poll_and_download() {
    let polls = Arc::new(AtomicUsize::new(0));
    let poll_counter = polls.clone();
    let sample = png(8, 4);

    let server = FakeFlux::start(move |req, base| match req.path.as_str() {
        "/v1/flux-pro-1.1-ultra" => Reply::json(serde_json::json!({
            "id": "task-1",
            "polling_url": format!("{}/v1/get_result?id=task-1", base),
        })),
        "/v1/get_result?id=task-1" => {
            if poll_counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Reply::json(serde_json::json!({ "id": "task-1", "status": "Pending" }))
            } else {
                Reply::json(serde_json::json!({
                    "id": "task-1",
                    "status": "Ready",
                    "result": { "sample": format!("{}/samples/task-1.png", base) },
                }))
            }
        }
        "/samples/task-1.png" => Reply {
            status: 200,
            content_type: "image/png",
            body: sample.clone(),
        },
        _ => Reply::status(404, "unknown route"),
    })
    .await;

    let client = client_for(&server, 5);
    let image = client.generate(&request("a red fox in snow")).await.unwrap();

    assert_eq!(image.format, ImageFormat::Png);
    assert_eq!((image.width, image.height), (8, 4));
    assert_eq!(image.data, png(8, 4));
    assert_eq!(polls.load(Ordering::SeqCst), 2);

    let seen = server.seen();
    let submit = seen
        .iter()
        .find(|r| r.method == "POST")
        .expect("submit request");
    assert!(submit.head.contains("x-key: test-key"));

    let body: serde_json::Value = serde_json::from_str(&submit.body).unwrap();
    assert_eq!(body["prompt"], "a red fox in snow");
    assert_eq!(body["aspect_ratio"], "16:9");
    assert_eq!(body["quality"], "high");
    assert_eq!(body["output_format"], "jpeg");
    assert_eq!(body["safety_tolerance"], 6);
    assert_eq!(body["raw"], true);

    let polls_seen: Vec<_> = seen.iter().filter(|r| r.path.starts_with("/v1/get_result")).collect();
    assert!(polls_seen.iter().all(|r| r.method == "GET" && r.head.contains("x-key: test-key")));
}

#[tokio::test]
async fn test_moderated_request_is_reported() {
    let server = FakeFlux::start(|req, base| match req.path.as_str() {
        "/v1/flux-pro-1.1-ultra" => Reply::json(serde_json::json!({
            "id": "task-2",
            "polling_url": format!("{}/poll", base),
        })),
        _ => Reply::json(serde_json::json!({ "id": "task-2", "status": "Request Moderated" })),
    })
    .await;

    let err = client_for(&server, 5)
        .generate(&request("something unsafe"))
        .await
        .unwrap_err();
    assert!(matches!(err, FluxError::Moderated(_)));
    assert!(err.to_string().contains("moderated"));
}

#[tokio::test]
async fn test_missing_polling_url_is_a_decode_error() {
    let server = FakeFlux::start(|_, _| Reply::json(serde_json::json!({ "id": "task-3" }))).await;

    let err = client_for(&server, 5)
        .generate(&request("a lighthouse"))
        .await
        .unwrap_err();
    assert!(matches!(err, FluxError::Decode(_)));
    assert!(err.to_string().contains("No polling URL"));
}

#[tokio::test]
async fn test_http_error_status_is_a_network_error() {
    let server = FakeFlux::start(|_, _| Reply::status(403, "Forbidden: invalid key")).await;

    let err = client_for(&server, 5)
        .generate(&request("a lighthouse"))
        .await
        .unwrap_err();
    assert!(matches!(err, FluxError::Network(_)));
    let message = err.to_string();
    assert!(message.contains("403"));
    assert!(message.contains("invalid key"));
}

#[tokio::test]
async fn test_polling_gives_up_after_max_attempts() {
    let server = FakeFlux::start(|req, base| match req.path.as_str() {
        "/v1/flux-pro-1.1-ultra" => Reply::json(serde_json::json!({
            "polling_url": format!("{}/poll", base),
        })),
        _ => Reply::json(serde_json::json!({ "status": "Pending" })),
    })
    .await;

    let err = client_for(&server, 3)
        .generate(&request("a slow render"))
        .await
        .unwrap_err();
    assert!(matches!(err, FluxError::Timeout(3)));

    let polls = server
        .seen()
        .iter()
        .filter(|r| r.path == "/poll")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn test_submitter_folds_api_failures_into_results() {
    let server = FakeFlux::start(|req, base| match req.path.as_str() {
        "/v1/flux-pro-1.1-ultra" => Reply::json(serde_json::json!({
            "polling_url": format!("{}/poll", base),
        })),
        _ => Reply::json(serde_json::json!({ "status": "Task not found" })),
    })
    .await;

    let config = flux_config(&server, 5);
    let api: Arc<dyn ImageApi> = Arc::new(FluxImageClient::new(&config).unwrap());
    let submitter = PromptSubmitter::new(api, &config);

    let result = submitter.submit(&request("a lost task")).await.unwrap();
    match result {
        GenerationResult::Failure { reason } => assert!(reason.contains("Task not found")),
        GenerationResult::Success(_) => panic!("expected a failure"),
    }
}
