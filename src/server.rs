use crate::ark::{self, ArkClient, Processed};
use crate::config::Config;
use crate::douyin::{self, DouyinClient, ResolvedVideo};
use crate::volc::{self, Transcriber, Transcript, Utterance};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

macro_rules! static_response {
    ($name:ident, $path:expr) => {
        static $name: &[u8] = include_bytes!(concat!("../static/", $path, ".gz"));
    };
}

static_response!(HTML_RESPONSE, "index.html");
static_response!(CSS_RESPONSE, "style.css");
static_response!(JS_RESPONSE, "script.js");

const READ_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
const QUEUE_CAPACITY: usize = 100;
const MAX_HEADER_SIZE: usize = 8 * 1024; // 8 KB
const MAX_BODY_SIZE: usize = 1024 * 1024; // 1 MB
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_DRAIN_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Deserialize)]
struct ResolveRequest {
    #[serde(alias = "text")]
    url: String,
}

#[derive(Deserialize)]
struct TranscribeRequest {
    play_url: Option<String>,
    #[serde(alias = "text")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct SummarizeRequest {
    #[serde(alias = "transcript")]
    text: String,
}

#[derive(Serialize)]
struct ResolveResponse {
    success: bool,
    aweme_id: String,
    play_url: String,
    duration: f64,
    title: String,
    author: String,
    cover_url: String,
}

#[derive(Serialize)]
struct TranscribeResponse {
    success: bool,
    text: String,
    duration: f64,
    utterances: Vec<Utterance>,
}

#[derive(Serialize)]
struct SummarizeResponse {
    success: bool,
    title: String,
    summary: String,
    corrected_text: String,
}

#[derive(Serialize)]
struct StatusResponse {
    transcribe_enabled: bool,
    summarize_enabled: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    kind: &'a str,
    error: &'a str,
}

impl From<ResolvedVideo> for ResolveResponse {
    fn from(video: ResolvedVideo) -> Self {
        Self {
            success: true,
            duration: round_tenths(video.duration_seconds),
            aweme_id: video.aweme_id,
            play_url: video.play_url,
            title: video.title,
            author: video.author,
            cover_url: video.cover_url,
        }
    }
}

impl From<Transcript> for TranscribeResponse {
    fn from(t: Transcript) -> Self {
        Self {
            success: true,
            text: t.text,
            duration: t.duration,
            utterances: t.utterances,
        }
    }
}

impl From<Processed> for SummarizeResponse {
    fn from(p: Processed) -> Self {
        Self {
            success: true,
            title: p.title,
            summary: p.summary,
            corrected_text: p.corrected_text,
        }
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// An error that is reported to the caller as a JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: &'static str,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: "400 Bad Request", kind: "invalid_request", message: message.into() }
    }

    fn not_configured(message: &str) -> Self {
        Self { status: "503 Service Unavailable", kind: "not_configured", message: message.into() }
    }
}

impl From<douyin::Error> for ApiError {
    fn from(err: douyin::Error) -> Self {
        let (status, kind) = match &err {
            douyin::Error::EmptyInput => ("400 Bad Request", "empty_input"),
            douyin::Error::NoLinkFound => ("400 Bad Request", "no_link_found"),
            douyin::Error::NoVideoId(_) => ("400 Bad Request", "no_video_id"),
            _ => ("502 Bad Gateway", "upstream"),
        };
        Self { status, kind, message: err.to_string() }
    }
}

impl From<volc::Error> for ApiError {
    fn from(err: volc::Error) -> Self {
        Self { status: "502 Bad Gateway", kind: "upstream", message: err.to_string() }
    }
}

impl From<ark::Error> for ApiError {
    fn from(err: ark::Error) -> Self {
        Self { status: "502 Bad Gateway", kind: "upstream", message: err.to_string() }
    }
}

/// Everything a worker needs to answer requests. Immutable once built.
pub struct App {
    douyin: DouyinClient,
    transcriber: Option<Transcriber>,
    ark: Option<ArkClient>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self {
            douyin: DouyinClient::new(&config.douyin),
            transcriber: config.volc.clone().map(Transcriber::new),
            ark: config.ark.clone().map(ArkClient::new),
        }
    }

    pub fn resolve(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        let req: ResolveRequest = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?;

        let video = self.douyin.resolve(&req.url)?;
        to_json(&ResolveResponse::from(video))
    }

    pub fn transcribe(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        // credentials are checked before the body so nothing goes out unconfigured
        let transcriber = self.transcriber.as_ref().ok_or_else(|| {
            ApiError::not_configured("transcription is not configured: set VOLC_APP_ID and VOLC_ACCESS_TOKEN")
        })?;

        let req: TranscribeRequest = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?;

        let play_url = match (req.play_url.filter(|u| !u.trim().is_empty()), req.url) {
            (Some(play_url), _) => play_url.trim().to_string(),
            (None, Some(input)) => self.douyin.resolve(&input)?.play_url,
            (None, None) => return Err(ApiError::bad_request("either play_url or url is required")),
        };

        let transcript = transcriber.transcribe(&play_url)?;
        to_json(&TranscribeResponse::from(transcript))
    }

    pub fn summarize(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        let ark = self
            .ark
            .as_ref()
            .ok_or_else(|| ApiError::not_configured("summarization is not configured: set ARK_API_KEY"))?;

        let req: SummarizeRequest = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?;
        if req.text.trim().is_empty() {
            return Err(ApiError::bad_request("text is empty"));
        }

        let processed = ark.process(req.text.trim())?;
        to_json(&SummarizeResponse::from(processed))
    }

    pub fn status(&self) -> Result<Vec<u8>, ApiError> {
        to_json(&StatusResponse {
            transcribe_enabled: self.transcriber.is_some(),
            summarize_enabled: self.ark.is_some(),
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value).map_err(|e| ApiError {
        status: "500 Internal Server Error",
        kind: "internal",
        message: format!("JSON serialization error: {}", e),
    })
}

struct WorkItem {
    stream: TcpStream,
}

/// Accepts connections forever, handing each to the worker pool.
pub fn serve(listener: TcpListener, app: Arc<App>, num_workers: usize) -> io::Result<()> {
    let (sender, receiver) = bounded(QUEUE_CAPACITY);

    for id in 0..num_workers {
        let receiver = receiver.clone();
        let app = Arc::clone(&app);
        thread::spawn(move || worker(id, receiver, app));
    }

    info!(addr = %listener.local_addr()?, workers = num_workers, "ready to accept requests");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_connection(stream, &sender) {
                    error!(error = %e, "connection error");
                }
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
    Ok(())
}

fn handle_connection(stream: TcpStream, sender: &Sender<WorkItem>) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_WRITE_TIMEOUT))?;
    stream.set_write_timeout(Some(READ_WRITE_TIMEOUT))?;

    let mut stream_clone = stream.try_clone()?;
    let work_item = WorkItem { stream };

    match sender.try_send(work_item) {
        Ok(()) => Ok(()),
        Err(crossbeam_channel::TrySendError::Full(_)) => {
            warn!("request queue full");
            write_error_response(&mut stream_clone, "503 Service Unavailable", "Server is busy, please try again later.")
        }
        Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
            write_error_response(&mut stream_clone, "500 Internal Server Error", "Worker pool has been disconnected.")
        }
    }
}

fn worker(id: usize, receiver: Receiver<WorkItem>, app: Arc<App>) {
    info!(worker = id, "worker started");
    while let Ok(mut work_item) = receiver.recv() {
        if let Err(e) = handle_request(&mut work_item.stream, &app) {
            warn!(worker = id, error = %e, "request failed");
            let status = match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => "400 Bad Request",
                _ => "500 Internal Server Error",
            };
            let _ = write_error_response(&mut work_item.stream, status, &e.to_string());
            drain_and_close(&mut work_item.stream);
        }
    }
    info!(worker = id, "worker shutting down");
}

/// Discards whatever the client is still sending before the socket drops, so a
/// rejected request sees the error response instead of a connection reset.
fn drain_and_close(stream: &mut TcpStream) {
    if stream.shutdown(Shutdown::Write).is_err() {
        return;
    }
    let _ = stream.set_read_timeout(Some(DRAIN_TIMEOUT));
    let _ = io::copy(&mut stream.take(MAX_DRAIN_SIZE), &mut io::sink());
}

fn handle_request(stream: &mut TcpStream, app: &App) -> io::Result<()> {
    let (headers, body_start_index) = read_headers_from_stream(stream)?;
    let request_data = &headers[..body_start_index];
    let initial_body = &headers[body_start_index..];

    let request_line = request_data
        .split(|&b| b == b'\n')
        .find(|l| !l.is_empty())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Empty request"))?;

    let mut parts = request_line.split(|&b| b == b' ');
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or(b"/");
    let path = target.split(|&b| b == b'?').next().unwrap_or(target);

    match (method, path) {
        (b"GET", b"/") | (b"GET", b"/index.html") => write_static_response(stream, "text/html; charset=utf-8", HTML_RESPONSE),
        (b"GET", b"/style.css") => write_static_response(stream, "text/css", CSS_RESPONSE),
        (b"GET", b"/script.js") => write_static_response(stream, "application/javascript", JS_RESPONSE),
        (b"GET", b"/api/status") => respond_json(stream, "/api/status", app.status()),
        (b"POST", b"/api/resolve") => {
            let body = read_post_body(request_data, initial_body, stream)?;
            respond_json(stream, "/api/resolve", app.resolve(&body))
        }
        (b"POST", b"/api/transcribe") => {
            let body = read_post_body(request_data, initial_body, stream)?;
            respond_json(stream, "/api/transcribe", app.transcribe(&body))
        }
        (b"POST", b"/api/summarize") => {
            let body = read_post_body(request_data, initial_body, stream)?;
            respond_json(stream, "/api/summarize", app.summarize(&body))
        }
        _ => write_error_response(stream, "404 Not Found", "Not Found"),
    }
}

fn respond_json(stream: &mut TcpStream, route: &str, result: Result<Vec<u8>, ApiError>) -> io::Result<()> {
    match result {
        Ok(body) => {
            info!(route, "request served");
            write_response(stream, "200 OK", "application/json", &body)
        }
        Err(err) => {
            warn!(route, kind = err.kind, error = %err.message, "request rejected");
            let body = serde_json::to_vec(&ErrorBody { success: false, kind: err.kind, error: &err.message })
                .map_err(|e| io::Error::other(format!("JSON serialization error: {}", e)))?;
            write_response(stream, err.status, "application/json", &body)
        }
    }
}

fn read_post_body(request_data: &[u8], initial_body: &[u8], stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let content_length = get_content_length(request_data)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Content-Length header is required for POST"))?;

    if content_length > MAX_BODY_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Request body too large"));
    }

    read_body(initial_body, content_length, stream)
}

fn read_headers_from_stream(stream: &mut TcpStream) -> io::Result<(Vec<u8>, usize)> {
    const HEADER_END: &[u8] = b"\r\n\r\n";

    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0; 512];
    loop {
        let bytes_read = stream.read(&mut chunk)?;
        if bytes_read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Connection closed while reading headers"));
        }
        // rescan only the tail that could hold a terminator split across reads
        let scan_from = buffer.len().saturating_sub(HEADER_END.len() - 1);
        buffer.extend_from_slice(&chunk[..bytes_read]);

        if let Some(pos) = buffer[scan_from..].windows(HEADER_END.len()).position(|w| w == HEADER_END) {
            return Ok((buffer, scan_from + pos + HEADER_END.len()));
        }

        if buffer.len() > MAX_HEADER_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Headers too large"));
        }
    }
}

fn write_response(stream: &mut TcpStream, status: &str, content_type: &str, content: &[u8]) -> io::Result<()> {
    write_response_with_headers(stream, status, content_type, &[], content)
}

fn write_response_with_headers(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    content: &[u8],
) -> io::Result<()> {
    let mut head = format!("HTTP/1.1 {}\r\nContent-Type: {}\r\n", status, content_type);
    for (name, value) in extra_headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", content.len()));

    stream.write_all(head.as_bytes())?;
    stream.write_all(content)?;
    stream.flush()
}

fn write_static_response(stream: &mut TcpStream, content_type: &str, content: &[u8]) -> io::Result<()> {
    write_response_with_headers(stream, "200 OK", content_type, &[("Content-Encoding", "gzip")], content)
}

fn write_error_response(stream: &mut TcpStream, status: &str, msg: &str) -> io::Result<()> {
    write_response(stream, status, "text/plain; charset=utf-8", msg.as_bytes())
}

fn get_content_length(headers: &[u8]) -> Option<usize> {
    std::str::from_utf8(headers)
        .ok()?
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

fn read_body(initial_data: &[u8], content_length: usize, stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut body = Vec::with_capacity(content_length);
    body.extend_from_slice(initial_data);
    body.truncate(content_length);

    let remaining_bytes = content_length.saturating_sub(body.len());

    if remaining_bytes > 0 {
        let mut remaining_body_reader = stream.take(remaining_bytes as u64);
        remaining_body_reader.read_to_end(&mut body)?;
    }

    Ok(body)
}
