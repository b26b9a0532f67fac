//! Shared fakes and fixtures for unit tests.

use crate::audio::vad::{SpeechDetector, VadError, FRAME_SAMPLES};
use crate::config::AppConfig;
use crate::state::AppState;
use crate::transcription::engine::SpeechRecognizer;
use crate::transcription::{RecognizerLoader, SpeechModel, TranscriptionError};
use actix_web::dev::ServerHandle;
use actix_web::test::TestRequest;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Write 16 kHz mono 16-bit PCM samples as a WAV file.
pub fn write_wav(path: &Path, samples: &[i16]) {
    std::fs::write(path, wav_bytes(samples)).unwrap();
}

/// A canonical 44-byte RIFF header followed by little-endian samples.
pub fn wav_bytes(samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_len).unwrap();
    out.extend_from_slice(b"WAVEfmt ");
    out.write_u32::<LittleEndian>(16).unwrap();
    out.write_u16::<LittleEndian>(1).unwrap(); // PCM
    out.write_u16::<LittleEndian>(1).unwrap(); // mono
    out.write_u32::<LittleEndian>(16_000).unwrap();
    out.write_u32::<LittleEndian>(16_000 * 2).unwrap();
    out.write_u16::<LittleEndian>(2).unwrap();
    out.write_u16::<LittleEndian>(16).unwrap();
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_len).unwrap();
    for sample in samples {
        out.write_i16::<LittleEndian>(*sample).unwrap();
    }
    out
}

/// A loud sine tone, comfortably above any speech threshold.
pub fn loud_tone(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| (16_000.0 * (i as f32 * 0.2).sin()) as i16)
        .collect()
}

pub fn silent_wav_bytes(seconds: usize) -> Vec<u8> {
    wav_bytes(&vec![0i16; 16_000 * seconds])
}

struct FakeRecognizer {
    segments: Option<Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl SpeechRecognizer for FakeRecognizer {
    fn recognize(&self, _samples: &[f32]) -> Result<Vec<String>, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.segments
            .clone()
            .ok_or_else(|| TranscriptionError::ModelUnavailable("fake recognizer refuses to run".to_string()))
    }
}

/// Loader handing out scripted recognizers while counting calls.
pub struct FakeLoader {
    segments: Option<Vec<String>>,
    load_delay: Duration,
    failing_loads: AtomicUsize,
    loads: AtomicUsize,
    recognizes: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn with_segments(segments: &[&str]) -> Self {
        Self {
            segments: Some(segments.iter().map(|s| s.to_string()).collect()),
            load_delay: Duration::ZERO,
            failing_loads: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            recognizes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Recognizers that error if they are ever asked to run.
    pub fn failing_recognizer() -> Self {
        Self {
            segments: None,
            ..Self::with_segments(&[])
        }
    }

    pub fn with_load_delay_ms(mut self, ms: u64) -> Self {
        self.load_delay = Duration::from_millis(ms);
        self
    }

    pub fn failing_first_loads(self, count: usize) -> Self {
        self.failing_loads.store(count, Ordering::SeqCst);
        self
    }

    pub fn load_calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn recognize_calls(&self) -> usize {
        self.recognizes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognizerLoader for FakeLoader {
    async fn load(&self, model: SpeechModel) -> Result<Arc<dyn SpeechRecognizer>, TranscriptionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        let fail = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TranscriptionError::ModelLoad(format!("{} weights unavailable", model)));
        }
        Ok(Arc::new(FakeRecognizer {
            segments: self.segments.clone(),
            calls: self.recognizes.clone(),
        }))
    }
}

/// Stands in for Silero: any frame with a non-trivial sample is speech.
pub struct PeakDetector;

impl SpeechDetector for PeakDetector {
    fn probabilities(&self, samples: &[f32]) -> Result<Vec<f32>, VadError> {
        Ok(samples
            .chunks(FRAME_SAMPLES)
            .map(|frame| {
                let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                if peak > 1e-3 { 1.0 } else { 0.0 }
            })
            .collect())
    }
}

/// State wired to a fake recognizer, with both summarization backends out of reach.
pub fn test_state(loader: FakeLoader) -> AppState {
    let mut config = AppConfig::default();
    config.local_llm.base_url = "http://127.0.0.1:1".to_string();
    config.local_llm.timeout_secs = 2;
    config.local_llm.ping_timeout_secs = 1;
    config.hosted_llm.api_key = None;
    AppState::with_loader(config, Arc::new(loader), Some(Arc::new(PeakDetector))).unwrap()
}

/// Initialise the full route table around a state.
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(crate::handlers::configure),
        )
        .await
    };
}
pub(crate) use test_app;

const BOUNDARY: &str = "voice-notes-test-boundary";

/// Build a `multipart/form-data` POST. Fields with a filename are sent as files.
pub fn multipart_request(uri: &str, fields: &[(&str, Option<&str>, &[u8])]) -> TestRequest {
    let mut body = Vec::new();
    for (name, filename, data) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    TestRequest::post()
        .uri(uri)
        .insert_header((
            actix_web::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
}

/// One request seen by a [`StubBackend`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// A JSON endpoint on a real local port that answers every POST to `path`
/// with `reply` and records what it was sent.
pub struct StubBackend {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: ServerHandle,
}

impl StubBackend {
    /// Must be called from inside an actix system (`#[actix_web::test]`).
    pub fn start(path: &'static str, reply: serde_json::Value) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let server = HttpServer::new(move || {
            let recorded = recorded.clone();
            let reply = reply.clone();
            App::new().route(
                path,
                web::post().to(move |req: HttpRequest, body: web::Json<serde_json::Value>| {
                    let recorded = recorded.clone();
                    let reply = reply.clone();
                    async move {
                        let authorization = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        recorded.lock().unwrap().push(RecordedRequest {
                            authorization,
                            body: body.into_inner(),
                        });
                        HttpResponse::Ok().json(reply)
                    }
                }),
            )
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();

        let base_url = format!("http://{}", server.addrs()[0]);
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            base_url,
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}
