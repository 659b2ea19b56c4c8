//! Shared fixtures: sheet builders, a scripted completion client, and a canned
//! HTTP server for the chat-completion client.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use tabula_core::config::{ComputeSettings, RunConfig};
use tabula_core::models::{Column, ComputeResult, ComputeTask, Row, Sheet};
use tabula_core::orchestration::{CompletionClient, ComputeEngine};
use tabula_core::persistence::InMemorySheetStore;

pub const NAME: &str = "c_name";
pub const OUT: &str = "c_out";

/// A `Name` text column plus an AI column `Out` driven by `formula`
pub fn people_sheet(formula: &str, names: &[&str]) -> Sheet {
    let rows = names
        .iter()
        .enumerate()
        .map(|(i, name)| Row::new(format!("r{}", i + 1)).with_value(NAME, *name))
        .collect();

    Sheet::new("s1", "People")
        .with_columns(vec![
            Column::text(NAME, "Name"),
            Column::ai(OUT, "Out", formula),
        ])
        .with_rows(rows)
}

/// Completion client with a fixed latency that tracks how many calls overlap
///
/// Prompts containing any of the failing markers resolve to `HTTP 500`; all
/// others echo the prompt back.
pub struct ScriptedClient {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedClient {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_when_prompt_contains(&self, marker: &str) {
        self.failing.lock().insert(marker.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn outcome(&self, task: &ComputeTask) -> ComputeResult {
        let fails = self
            .failing
            .lock()
            .iter()
            .any(|marker| task.rendered_prompt.contains(marker.as_str()));
        if fails {
            ComputeResult::failure(task, "HTTP 500")
        } else {
            ComputeResult::success(task, format!("echo: {}", task.rendered_prompt))
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, task: &ComputeTask, cancel: &CancellationToken) -> ComputeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(task.rendered_prompt.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => ComputeResult::request_cancelled(task),
            _ = tokio::time::sleep(self.delay) => self.outcome(task),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn settings(concurrency: usize) -> ComputeSettings {
    ComputeSettings {
        concurrency,
        ..ComputeSettings::default()
    }
}

pub fn engine(
    client: Arc<ScriptedClient>,
    store: Arc<InMemorySheetStore>,
    concurrency: usize,
    run_config: RunConfig,
) -> ComputeEngine {
    ComputeEngine::new(client, store, settings(concurrency), run_config)
}

/// One request as seen by [`CannedServer`]
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Local HTTP server answering every request with one fixed response
pub struct CannedServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CannedServer {
    pub async fn start(status: u16, body: &str) -> Self {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    pub async fn start_with_delay(status: u16, body: &str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let body = body.to_string();
        let captured = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let body = body.clone();
                let captured = Arc::clone(&captured);
                tokio::spawn(async move {
                    serve_one(stream, status, &body, delay, captured).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().clone()
    }
}

async fn serve_one(
    mut stream: TcpStream,
    status: u16,
    body: &str,
    delay: Duration,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let Ok(read) = stream.read(&mut chunk).await else { return };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = find(&buffer, b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buffer.len() < head_end + content_length {
        let Ok(read) = stream.read(&mut chunk).await else { return };
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let request_body = String::from_utf8_lossy(&buffer[head_end..]).to_string();
    captured.lock().push(CapturedRequest {
        head,
        body: request_body,
    });

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        reason(status),
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}
