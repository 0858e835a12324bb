//! Wire-level upload tests against an in-process HTTP server.
//!
//! The server captures the raw request bytes so the tests can check the
//! actual multipart framing and Content-Length on the wire, not just the
//! client's view of them.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use voxlink::audio::ScratchStore;
use voxlink::config::Config;
use voxlink::upload::{AgentClient, UploadError, UploadProgress};

struct CapturedRequest {
    head: String,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.eq_ignore_ascii_case(name) {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
    }

    /// Boundary token from the Content-Type header.
    fn boundary(&self) -> String {
        let content_type = self.header("content-type").expect("no content-type");
        content_type
            .split_once("boundary=")
            .expect("no boundary parameter")
            .1
            .to_string()
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// One-connection-at-a-time HTTP server that answers every request with the
/// given status line and body, forwarding each captured request on a channel.
async fn spawn_server(
    status_line: &'static str,
    reply_body: &'static str,
) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];

            // Read until the end of the header block
            let head_end = loop {
                let n = socket.read(&mut tmp).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&tmp[..n]);
                if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let content_length: usize = head
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    if key.eq_ignore_ascii_case("content-length") {
                        value.trim().parse().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);

            let mut body = buf[head_end..].to_vec();
            while body.len() < content_length {
                let n = socket.read(&mut tmp).await.unwrap();
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&tmp[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                reply_body.len(),
                reply_body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;

            if tx.send(CapturedRequest { head, body }).await.is_err() {
                return;
            }
        }
    });

    (addr, rx)
}

fn config_for(addr: SocketAddr) -> Config {
    Config {
        server_url: format!("http://{}", addr),
        ..Config::default()
    }
}

/// Write a short valid clip to a scratch store in a temp dir.
fn scratch_with_clip(dir: &std::path::Path) -> (ScratchStore, u64) {
    let scratch = ScratchStore::in_dir(dir, "recording.wav").unwrap();
    let samples: Vec<i16> = (0..16_000)
        .map(|i| (8_000.0 * (i as f32 * 0.3).sin()) as i16)
        .collect();
    let bytes = scratch.write_recording(&samples, 16_000).unwrap();
    (scratch, bytes)
}

#[tokio::test]
async fn upload_frames_multipart_with_exact_content_length() {
    let (addr, mut requests) = spawn_server("200 OK", "It is sunny today").await;
    let dir = tempfile::tempdir().unwrap();
    let (scratch, _) = scratch_with_clip(dir.path());

    let client = AgentClient::new(&config_for(addr));
    client.mark_online(true);

    let (progress_tx, mut progress_rx) = mpsc::channel::<UploadProgress>(1024);
    let reply = client.upload(scratch.path(), progress_tx).await.unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "It is sunny today");

    let request = requests.recv().await.unwrap();

    // Request line and headers
    assert!(
        request.head.starts_with("POST /voice-to-agent HTTP/1.1\r\n"),
        "unexpected request line: {}",
        request.head.lines().next().unwrap_or("")
    );
    let boundary = request.boundary();
    let advertised: usize = request
        .header("content-length")
        .expect("no content-length")
        .parse()
        .unwrap();
    assert_eq!(
        advertised,
        request.body.len(),
        "Content-Length must match the bytes actually sent"
    );

    // Framing: opening delimiter, closing delimiter, part order
    let opening = format!("--{}\r\n", boundary);
    let closing = format!("\r\n--{}--\r\n", boundary);
    assert!(request.body.starts_with(opening.as_bytes()));
    assert!(request.body.ends_with(closing.as_bytes()));

    let agent_at = find_subslice(&request.body, b"name=\"agentName\"").unwrap();
    let audio_at = find_subslice(&request.body, b"name=\"audio\"").unwrap();
    assert!(agent_at < audio_at, "agentName part must precede the audio");
    assert!(find_subslice(&request.body, b"generalAgent").is_some());
    assert!(find_subslice(&request.body, b"filename=\"audio.wav\"").is_some());
    assert!(find_subslice(&request.body, b"Content-Type: audio/wav").is_some());

    // The WAV payload itself made it through intact
    let wav = std::fs::read(scratch.path()).unwrap();
    assert!(find_subslice(&request.body, &wav).is_some());

    // Progress ends at exactly 100 and never goes backwards
    let mut last = 0u8;
    while let Ok(report) = progress_rx.try_recv() {
        assert!(report.percent >= last);
        last = report.percent;
    }
    assert_eq!(last, 100);
}

#[tokio::test]
async fn server_error_status_and_body_are_preserved() {
    let (addr, mut requests) = spawn_server("500 Internal Server Error", "agent exploded").await;
    let dir = tempfile::tempdir().unwrap();
    let (scratch, _) = scratch_with_clip(dir.path());

    let client = AgentClient::new(&config_for(addr));
    client.mark_online(true);

    let (progress_tx, _progress_rx) = mpsc::channel(1024);
    let err = client
        .upload(scratch.path(), progress_tx)
        .await
        .expect_err("500 must surface as an error");

    match err {
        UploadError::ServerError { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "agent exploded");
        }
        other => panic!("expected ServerError, got {:?}", other),
    }

    // The full request still arrived at the server
    let request = requests.recv().await.unwrap();
    let advertised: usize = request.header("content-length").unwrap().parse().unwrap();
    assert_eq!(advertised, request.body.len());
}

#[tokio::test]
async fn connection_refused_reports_status_zero() {
    // Grab a free port, then close the listener so connections are refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let (scratch, _) = scratch_with_clip(dir.path());

    let client = AgentClient::new(&config_for(addr));
    client.mark_online(true);

    let (progress_tx, _progress_rx) = mpsc::channel(1024);
    let err = client
        .upload(scratch.path(), progress_tx)
        .await
        .expect_err("refused connection must surface as an error");

    assert!(
        matches!(err, UploadError::ServerError { status: 0, .. }),
        "expected status 0, got {:?}",
        err
    );
}

#[tokio::test]
async fn probe_marks_client_online_and_returns_the_reply() {
    let (addr, mut requests) = spawn_server("200 OK", "{\"agents\":[\"generalAgent\"]}").await;

    let client = AgentClient::new(&config_for(addr));
    assert!(!client.is_online(), "fresh client starts offline");

    let reply = client.probe().await.unwrap();
    assert_eq!(reply.status, 200);
    assert!(reply.body.contains("generalAgent"));
    assert!(client.is_online());

    let request = requests.recv().await.unwrap();
    assert!(request.head.starts_with("GET /api HTTP/1.1\r\n"));
}

#[tokio::test]
async fn probe_failure_marks_client_offline_and_blocks_uploads() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AgentClient::new(&config_for(addr));
    client.mark_online(true);

    let err = client.probe().await.expect_err("probe must fail");
    assert!(matches!(err, UploadError::ServerError { status: 0, .. }));
    assert!(!client.is_online());

    // Upload now fails fast without touching the filesystem
    let (progress_tx, _progress_rx) = mpsc::channel(1);
    let err = client
        .upload(std::path::Path::new("/nonexistent.wav"), progress_tx)
        .await
        .expect_err("offline client must not upload");
    assert!(matches!(err, UploadError::TransportUnavailable));
}
