//! Shared fakes for provider and orchestrator tests.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::controller::ControllerLink;
use crate::decoder::SourceDecoder;
use crate::error::{MediaError, Result};
use crate::pipeline::AudioStreamPipeline;
use crate::providers::video_provider::VideoBackend;
use crate::sink::AudioSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Start,
    Suspend,
    Resume,
    Stop,
}

/// Sink that records control calls and never opens a device.
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn new(calls: Arc<Mutex<Vec<SinkCall>>>) -> Self {
        Self { calls }
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AudioSink for RecordingSink {
    fn start(&mut self, _pipeline: Arc<Mutex<AudioStreamPipeline>>) -> Result<()> {
        self.record(SinkCall::Start);
        Ok(())
    }

    fn suspend(&mut self) {
        self.record(SinkCall::Suspend);
    }

    fn resume(&mut self) {
        self.record(SinkCall::Resume);
    }

    fn stop(&mut self) {
        self.record(SinkCall::Stop);
    }
}

/// Sink whose device never opens.
pub struct FailingSink;

impl AudioSink for FailingSink {
    fn start(&mut self, _pipeline: Arc<Mutex<AudioStreamPipeline>>) -> Result<()> {
        Err(MediaError::Sink("no default output device".to_string()))
    }

    fn suspend(&mut self) {}

    fn resume(&mut self) {}

    fn stop(&mut self) {}
}

enum DecoderScript {
    Silent,
    Deliver { pcm: Vec<u8>, finish: bool },
    Fail(String),
}

/// Decoder that feeds the pipeline synchronously from a fixed script
/// instead of spawning a worker.
pub struct ScriptedDecoder {
    script: DecoderScript,
    pub started: Arc<Mutex<Vec<String>>>,
    pub cancelled: Arc<Mutex<bool>>,
}

impl ScriptedDecoder {
    fn with_script(script: DecoderScript) -> Self {
        Self {
            script,
            started: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    /// Starts without delivering anything.
    pub fn silent() -> Self {
        Self::with_script(DecoderScript::Silent)
    }

    /// Delivers `pcm` in one chunk, then optionally signals completion.
    pub fn delivering(pcm: Vec<u8>, finish: bool) -> Self {
        Self::with_script(DecoderScript::Deliver { pcm, finish })
    }

    /// Reports a decode failure immediately.
    pub fn failing(error: &str) -> Self {
        Self::with_script(DecoderScript::Fail(error.to_string()))
    }
}

impl SourceDecoder for ScriptedDecoder {
    fn start(&mut self, source: &str, pipeline: Arc<Mutex<AudioStreamPipeline>>) {
        self.started.lock().unwrap().push(source.to_string());
        let mut pipeline = pipeline.lock().unwrap();
        match &self.script {
            DecoderScript::Silent => {}
            DecoderScript::Deliver { pcm, finish } => {
                pipeline.write_chunk(pcm);
                if *finish {
                    pipeline.decode_finished();
                }
            }
            DecoderScript::Fail(error) => pipeline.decode_failed(error.clone()),
        }
    }

    fn cancel(&mut self) {
        *self.cancelled.lock().unwrap() = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Play(String),
    Pause,
    Resume,
    Stop,
    Rewind,
    Seek(u64),
}

/// Video backend that records delegated calls.
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl RecordingBackend {
    pub fn new(calls: Arc<Mutex<Vec<BackendCall>>>) -> Self {
        Self { calls }
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl VideoBackend for RecordingBackend {
    fn play(&mut self, url: &str) {
        self.record(BackendCall::Play(url.to_string()));
    }

    fn pause(&mut self) {
        self.record(BackendCall::Pause);
    }

    fn resume(&mut self) {
        self.record(BackendCall::Resume);
    }

    fn stop(&mut self) {
        self.record(BackendCall::Stop);
    }

    fn rewind(&mut self) {
        self.record(BackendCall::Rewind);
    }

    fn seek(&mut self, offset_ms: u64) {
        self.record(BackendCall::Seek(offset_ms));
    }
}

/// Controller link that records outbound requests.
pub struct RecordingController {
    pub requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingController {
    pub fn new(requests: Arc<Mutex<Vec<(String, Value)>>>) -> Self {
        Self { requests }
    }
}

impl ControllerLink for RecordingController {
    fn send_request(&self, message_type: &str, payload: Value) {
        self.requests
            .lock()
            .unwrap()
            .push((message_type.to_string(), payload));
    }
}
