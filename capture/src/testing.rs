//! Test doubles for the hardware and network collaborators.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::Result;

use rowling_common::protocol::Phase;
use rowling_common::session::{SessionState, TriggerState};

use crate::camera::Camera;
use crate::connectivity::Probe;
use crate::dashboard::StateReporter;
use crate::display::CharDisplay;
use crate::drive::{FolderId, RemoteStorage};

/// Write a small, noisy JPEG so recompression has something to chew on.
pub fn write_test_jpeg(path: &Path, quality: u8) {
    let mut seed: u32 = 0x1234_5678;
    let img = image::RgbImage::from_fn(96, 64, |x, y| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let noise = (seed & 0x3f) as u8;
        image::Rgb([(x * 2) as u8 ^ noise, (y * 3) as u8 ^ noise, noise.wrapping_mul(3)])
    });
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&img)
        .unwrap();
    std::fs::write(path, bytes).unwrap();
}

// ── display ──────────────────────────────────────────────────────────────

/// Frames rendered by a [`RecordingDisplay`], readable after the display
/// has been boxed into a status board.
#[derive(Clone, Default)]
pub struct FrameLog(Arc<Mutex<Vec<(String, String)>>>);

impl FrameLog {
    pub fn frames(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }
}

pub struct RecordingDisplay {
    columns: usize,
    pending: [String; 2],
    log: FrameLog,
    pub fail_writes: bool,
    observed: Option<(Arc<SessionState>, Arc<Mutex<Vec<TriggerState>>>)>,
}

impl RecordingDisplay {
    pub fn new(columns: usize) -> (Self, FrameLog) {
        let log = FrameLog::default();
        (
            Self {
                columns,
                pending: Default::default(),
                log: log.clone(),
                fail_writes: false,
                observed: None,
            },
            log,
        )
    }

    /// Record the session state at the moment each frame completes.
    pub fn observe(&mut self, session: Arc<SessionState>) -> Arc<Mutex<Vec<TriggerState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        self.observed = Some((session, seen.clone()));
        seen
    }
}

impl CharDisplay for RecordingDisplay {
    fn clear(&mut self) -> Result<()> {
        self.pending = Default::default();
        Ok(())
    }

    fn write_line(&mut self, row: usize, text: &str) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("i2c bus error");
        }
        self.pending[row] = text.to_string();
        if row == 1 {
            let frame = (self.pending[0].clone(), self.pending[1].clone());
            self.log.0.lock().unwrap().push(frame);
            if let Some((session, seen)) = &self.observed {
                seen.lock().unwrap().push(session.state());
            }
        }
        Ok(())
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

// ── connectivity ─────────────────────────────────────────────────────────

pub struct ScriptedProbe {
    script: VecDeque<bool>,
    calls: usize,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Probe for ScriptedProbe {
    fn reachable(&mut self) -> bool {
        self.calls += 1;
        self.script.pop_front().unwrap_or(true)
    }
}

// ── camera ───────────────────────────────────────────────────────────────

/// Writes a real JPEG for every capture.  Can fail on demand, or press the
/// button (stop) after a given number of captures.
#[derive(Default)]
pub struct FileCamera {
    pub previewing: bool,
    pub preview_starts: usize,
    pub captures: usize,
    pub fail_captures: bool,
    pub stop_after: Option<(usize, Arc<SessionState>)>,
}

impl Camera for FileCamera {
    fn start_preview(&mut self) -> Result<()> {
        self.previewing = true;
        self.preview_starts += 1;
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        self.previewing = false;
        Ok(())
    }

    fn capture(&mut self, path: &Path) -> Result<()> {
        if self.fail_captures {
            anyhow::bail!("camera not responding");
        }
        write_test_jpeg(path, 100);
        self.captures += 1;
        if let Some((k, session)) = &self.stop_after {
            if self.captures == *k {
                session.press();
            }
        }
        Ok(())
    }
}

// ── dashboard ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    phases: Mutex<Vec<Phase>>,
}

impl RecordingReporter {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }
}

impl StateReporter for RecordingReporter {
    fn report(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }
}

// ── storage ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct StorageLog {
    folders: Vec<String>,
    uploads: Vec<(String, String)>,
}

/// In-memory storage.  Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingStorage {
    log: Arc<Mutex<StorageLog>>,
    /// 1-based upload call that fails.
    pub fail_on_call: Option<usize>,
    pub fail_folder: bool,
}

impl RecordingStorage {
    pub fn folders_ensured(&self) -> Vec<String> {
        self.log.lock().unwrap().folders.clone()
    }

    /// File names passed to `upload`, in call order.
    pub fn upload_attempts(&self) -> Vec<String> {
        self.log.lock().unwrap().uploads.iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn upload_folders(&self) -> Vec<String> {
        self.log.lock().unwrap().uploads.iter().map(|(f, _)| f.clone()).collect()
    }
}

impl RemoteStorage for RecordingStorage {
    fn ensure_folder(&mut self, name: &str) -> Result<FolderId> {
        if self.fail_folder {
            anyhow::bail!("drive unavailable");
        }
        self.log.lock().unwrap().folders.push(name.to_string());
        Ok(FolderId(format!("id-{name}")))
    }

    fn upload(&mut self, folder: &FolderId, path: &Path, name: &str) -> Result<()> {
        assert!(path.exists(), "upload of missing file {}", path.display());
        let call = {
            let mut log = self.log.lock().unwrap();
            log.uploads.push((folder.0.clone(), name.to_string()));
            log.uploads.len()
        };
        if self.fail_on_call == Some(call) {
            anyhow::bail!("simulated network failure");
        }
        Ok(())
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Request target, including the query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serves a fixed list of `(status, body)` replies, one connection each,
/// and records what it was sent.
pub struct StubServer {
    base: String,
    handle: JoinHandle<Vec<RecordedRequest>>,
}

impl StubServer {
    pub fn start(replies: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in replies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                requests.push(read_request(&mut reader));
                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                reader.get_mut().write_all(reply.as_bytes()).unwrap();
            }
            requests
        });
        Self { base, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Wait until every scripted reply has been served.
    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().unwrap()
    }
}

fn read_request<R: BufRead>(reader: &mut R) -> RecordedRequest {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).unwrap();
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((k, v)) = header.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).unwrap();

    RecordedRequest {
        method,
        path,
        headers,
        body,
    }
}
