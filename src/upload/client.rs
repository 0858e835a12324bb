//! HTTP client for the agent server
//!
//! Streams the scratch recording to the upload endpoint as multipart
//! form-data without buffering the whole file, and exposes a lightweight
//! connectivity probe against the status endpoint. One `AgentClient` holds
//! one shared `reqwest::Client` and one boundary token for its lifetime.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Client};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::multipart::{Boundary, UploadPlan};
use crate::config::Config;

pub const AGENT_FIELD: &str = "agentName";
pub const AUDIO_FIELD: &str = "audio";
pub const AUDIO_FILENAME: &str = "audio.wav";
pub const AUDIO_CONTENT_TYPE: &str = "audio/wav";

const CLIENT_USER_AGENT: &str = "voxlink/0.1";

/// Errors that can occur while talking to the agent server.
#[derive(Debug)]
pub enum UploadError {
    /// Transport is not connected (startup probe has not succeeded).
    TransportUnavailable,
    /// Scratch file could not be opened or read.
    StorageUnavailable(String),
    /// Non-success reply, or a connection-level failure (status 0).
    ServerError { status: u16, detail: String },
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::TransportUnavailable => write!(f, "Network not connected"),
            UploadError::StorageUnavailable(e) => {
                write!(f, "Failed to open recording: {}", e)
            }
            UploadError::ServerError { status: 0, detail } => {
                write!(f, "Server unreachable: {}", detail)
            }
            UploadError::ServerError { status, detail } => {
                write!(f, "Server error ({}): {}", status, detail)
            }
        }
    }
}

impl std::error::Error for UploadError {}

/// Reply from the server: numeric status plus the full text body.
#[derive(Debug, Clone)]
pub struct ServerReply {
    pub status: u16,
    pub body: String,
}

/// Progress report emitted once per streamed chunk.
#[derive(Debug, Clone, Copy)]
pub struct UploadProgress {
    pub percent: u8,
    pub sent: u64,
    pub total: u64,
}

/// Client for the fixed agent-server endpoints.
pub struct AgentClient {
    http: Client,
    boundary: Boundary,
    upload_url: String,
    status_url: String,
    agent_name: String,
    chunk_size: usize,
    upload_timeout: Duration,
    probe_timeout: Duration,
    online: AtomicBool,
}

impl AgentClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            boundary: Boundary::generate(),
            upload_url: config.upload_url(),
            status_url: config.status_url(),
            agent_name: config.agent_name.clone(),
            chunk_size: config.upload_chunk_size.max(1),
            upload_timeout: config.upload_timeout(),
            probe_timeout: config.probe_timeout(),
            online: AtomicBool::new(false),
        }
    }

    /// Whether the last probe found the server reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Override the connectivity state (startup wiring and tests).
    pub fn mark_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Plain GET against the status endpoint with the short probe timeout.
    /// Any response status counts as reachable; only connection-level
    /// failures mark the client offline.
    pub async fn probe(&self) -> Result<ServerReply, UploadError> {
        let result = self
            .http
            .get(&self.status_url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                self.online.store(true, Ordering::SeqCst);
                log::info!("Server reachable (status {})", status);
                Ok(ServerReply { status, body })
            }
            Err(e) => {
                self.online.store(false, Ordering::SeqCst);
                log::warn!("Server probe failed: {}", e);
                Err(UploadError::ServerError {
                    status: 0,
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Stream one recording plus the agent-name field to the upload
    /// endpoint as multipart/form-data.
    ///
    /// The body length is computed up front and sent as `Content-Length`;
    /// the file is read in fixed-size chunks so memory use stays bounded
    /// regardless of file size. Each chunk reports cumulative progress over
    /// `progress` and yields to the runtime before the next read. The file
    /// handle and connection are released on every exit path (both are owned
    /// by the request future). No retry is attempted here; callers decide
    /// whether to retry the whole operation.
    pub async fn upload(
        &self,
        file_path: &Path,
        progress: mpsc::Sender<UploadProgress>,
    ) -> Result<ServerReply, UploadError> {
        if !self.is_online() {
            return Err(UploadError::TransportUnavailable);
        }

        let file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| UploadError::StorageUnavailable(format!("{:?}: {}", file_path, e)))?;
        let file_len = file
            .metadata()
            .await
            .map_err(|e| UploadError::StorageUnavailable(e.to_string()))?
            .len();

        let plan = UploadPlan::new(
            &self.boundary,
            AGENT_FIELD,
            &self.agent_name,
            AUDIO_FIELD,
            AUDIO_FILENAME,
            AUDIO_CONTENT_TYPE,
            file_len,
        );
        let total = plan.total_len();

        log::info!(
            "Uploading {:?}: {} file bytes, {} body bytes, boundary {}",
            file_path,
            file_len,
            total,
            self.boundary.as_str()
        );

        let body = body_stream(file, plan, self.chunk_size, progress);

        let response = self
            .http
            .post(&self.upload_url)
            .header(CONTENT_TYPE, self.boundary.content_type())
            .header(CONTENT_LENGTH, total)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .timeout(self.upload_timeout)
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| UploadError::ServerError {
                status: 0,
                detail: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.unwrap_or_default();

        if status == 200 {
            log::info!("Upload accepted: {} chars in reply", body_text.len());
            Ok(ServerReply {
                status,
                body: body_text,
            })
        } else {
            log::error!("Upload rejected: status {}: {}", status, body_text);
            Err(UploadError::ServerError {
                status,
                detail: body_text,
            })
        }
    }
}

enum BodyPhase {
    Prologue,
    File { sent: u64 },
    Epilogue,
    Done,
}

struct BodyState {
    file: tokio::fs::File,
    plan: UploadPlan,
    chunk_size: usize,
    phase: BodyPhase,
    sent_total: u64,
    progress: mpsc::Sender<UploadProgress>,
}

impl BodyState {
    fn report(&mut self, chunk_len: usize) {
        self.sent_total += chunk_len as u64;
        let total = self.plan.total_len();
        let percent = if total == 0 {
            100
        } else {
            (self.sent_total * 100 / total) as u8
        };
        // UI feedback only: drop the report if the receiver is behind.
        let _ = self.progress.try_send(UploadProgress {
            percent,
            sent: self.sent_total,
            total,
        });
    }
}

/// Body stream: prologue, then the file in fixed-size chunks, then the
/// epilogue. Yields to the runtime before every chunk so pending lightweight
/// work is not starved; a short read against the planned file length aborts
/// the stream (and thereby the transfer) early.
fn body_stream(
    file: tokio::fs::File,
    plan: UploadPlan,
    chunk_size: usize,
    progress: mpsc::Sender<UploadProgress>,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send {
    let state = BodyState {
        file,
        plan,
        chunk_size,
        phase: BodyPhase::Prologue,
        sent_total: 0,
        progress,
    };

    futures_util::stream::try_unfold(state, |mut state| async move {
        tokio::task::yield_now().await;

        loop {
            match state.phase {
                BodyPhase::Prologue => {
                    let chunk = state.plan.prologue().to_vec();
                    state.phase = BodyPhase::File { sent: 0 };
                    state.report(chunk.len());
                    return Ok(Some((chunk, state)));
                }
                BodyPhase::File { sent } => {
                    let remaining = state.plan.file_len() - sent;
                    if remaining == 0 {
                        state.phase = BodyPhase::Epilogue;
                        continue;
                    }

                    let want = (state.chunk_size as u64).min(remaining) as usize;
                    let mut chunk = vec![0u8; want];
                    let n = state.file.read(&mut chunk).await?;
                    if n == 0 {
                        // File shrank under us; the byte count can no longer
                        // match the advertised Content-Length.
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!(
                                "recording truncated mid-upload ({} of {} bytes sent)",
                                sent,
                                state.plan.file_len()
                            ),
                        ));
                    }
                    chunk.truncate(n);
                    state.phase = BodyPhase::File {
                        sent: sent + n as u64,
                    };
                    state.report(n);
                    return Ok(Some((chunk, state)));
                }
                BodyPhase::Epilogue => {
                    let chunk = state.plan.epilogue().to_vec();
                    state.phase = BodyPhase::Done;
                    state.report(chunk.len());
                    return Ok(Some((chunk, state)));
                }
                BodyPhase::Done => return Ok(None),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::io::Write;

    fn test_plan(file_len: u64) -> UploadPlan {
        let boundary = Boundary::generate();
        UploadPlan::new(
            &boundary,
            AGENT_FIELD,
            "generalAgent",
            AUDIO_FIELD,
            AUDIO_FILENAME,
            AUDIO_CONTENT_TYPE,
            file_len,
        )
    }

    async fn collect_body(
        data: &[u8],
        planned_len: u64,
        chunk_size: usize,
    ) -> (Result<Vec<Vec<u8>>, std::io::Error>, Vec<UploadProgress>) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();

        let file = tokio::fs::File::open(tmp.path()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(1024);
        let stream = body_stream(file, test_plan(planned_len), chunk_size, tx);

        let chunks: Result<Vec<Vec<u8>>, _> = stream.try_collect().await;

        let mut reports = Vec::new();
        while let Ok(report) = rx.try_recv() {
            reports.push(report);
        }
        (chunks, reports)
    }

    #[tokio::test]
    async fn streamed_bytes_match_planned_content_length() {
        let data = vec![0xABu8; 2_500];
        let plan = test_plan(2_500);
        let (chunks, _) = collect_body(&data, 2_500, 1_024).await;
        let chunks = chunks.unwrap();

        let streamed: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        assert_eq!(streamed, plan.total_len());
    }

    #[tokio::test]
    async fn file_chunk_count_is_ceil_of_len_over_chunk_size() {
        for (len, chunk_size, expected) in
            [(2_500usize, 1_024usize, 3usize), (1_024, 1_024, 1), (1, 1_024, 1), (2_048, 512, 4)]
        {
            let data = vec![7u8; len];
            let (chunks, _) = collect_body(&data, len as u64, chunk_size).await;
            let chunks = chunks.unwrap();
            // prologue + file chunks + epilogue
            assert_eq!(chunks.len(), expected + 2, "len={} chunk={}", len, chunk_size);

            let file_bytes: usize = chunks[1..chunks.len() - 1].iter().map(|c| c.len()).sum();
            assert_eq!(file_bytes, len);
        }
    }

    #[tokio::test]
    async fn empty_file_still_frames_prologue_and_epilogue() {
        let (chunks, _) = collect_body(&[], 0, 1_024).await;
        let chunks = chunks.unwrap();
        assert_eq!(chunks.len(), 2);

        let plan = test_plan(0);
        let streamed: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        assert_eq!(streamed, plan.total_len());
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_reaches_one_hundred() {
        let data = vec![1u8; 5_000];
        let (chunks, reports) = collect_body(&data, 5_000, 512).await;
        chunks.unwrap();

        assert!(!reports.is_empty());
        let mut last = 0u8;
        for report in &reports {
            assert!(report.percent >= last);
            last = report.percent;
        }
        assert_eq!(last, 100);
        assert_eq!(reports.last().unwrap().sent, reports.last().unwrap().total);
    }

    #[tokio::test]
    async fn truncated_file_aborts_the_stream() {
        // Plan advertises more bytes than the file holds.
        let data = vec![9u8; 100];
        let (chunks, _) = collect_body(&data, 200, 64).await;
        let err = chunks.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn upload_fails_fast_when_offline() {
        let client = AgentClient::new(&Config::default());
        let (tx, _rx) = mpsc::channel(8);
        // Never probed, so the transport precondition fails before storage
        // is touched, even for a missing file.
        let err = client
            .upload(Path::new("/nonexistent/recording.wav"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TransportUnavailable));
    }

    #[tokio::test]
    async fn missing_file_is_a_storage_error_with_no_request() {
        let mut config = Config::default();
        // Unroutable: if a request were attempted it would error differently.
        config.server_url = "http://127.0.0.1:1".to_string();
        let client = AgentClient::new(&config);
        client.mark_online(true);

        let (tx, _rx) = mpsc::channel(8);
        let err = client
            .upload(Path::new("/nonexistent/recording.wav"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StorageUnavailable(_)));
    }

    #[test]
    fn error_display_preserves_status_code() {
        let err = UploadError::ServerError {
            status: 503,
            detail: "overloaded".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("overloaded"));

        let conn = UploadError::ServerError {
            status: 0,
            detail: "connection refused".to_string(),
        };
        assert!(conn.to_string().contains("unreachable"));
    }
}
