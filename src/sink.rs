//! Pull-based audio output sink.
//!
//! `CpalSink` drives a CPAL output stream whose callback pulls PCM from the
//! pipeline on the device's cadence. The stream object is confined to a
//! dedicated thread (CPAL streams are not `Send`) and controlled through a
//! command channel.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, warn};

use crate::error::{MediaError, Result};
use crate::pipeline::AudioStreamPipeline;

/// Output sink consuming the pipeline's pull-based read side.
pub trait AudioSink: Send {
    /// Opens the output and starts pulling from `pipeline`.
    fn start(&mut self, pipeline: Arc<Mutex<AudioStreamPipeline>>) -> Result<()>;
    /// Pauses delivery without releasing the device.
    fn suspend(&mut self);
    /// Resumes delivery after a suspend.
    fn resume(&mut self);
    /// Stops delivery and releases the device.
    fn stop(&mut self);
}

enum SinkCommand {
    Suspend,
    Resume,
    Stop,
}

/// CPAL-backed output sink.
pub struct CpalSink {
    control: Option<mpsc::Sender<SinkCommand>>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self { control: None }
    }

    fn send(&self, command: SinkCommand) {
        if let Some(control) = &self.control {
            let _ = control.send(command);
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self, pipeline: Arc<Mutex<AudioStreamPipeline>>) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MediaError::Sink("no default output device".to_string()))?;

        let (control_tx, control_rx) = mpsc::channel();
        self.control = Some(control_tx);

        // The stream itself is not Send, so it lives on this thread; the
        // device handle moves in.
        thread::spawn(move || {
            let spec = {
                let pipeline = pipeline.lock().expect("pipeline lock poisoned");
                pipeline.spec()
            };
            let config = cpal::StreamConfig {
                channels: spec.channels,
                sample_rate: cpal::SampleRate(spec.sample_rate_hz),
                buffer_size: cpal::BufferSize::Default,
            };
            let callback_pipeline = pipeline.clone();
            let stream = match device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    let bytes = {
                        let mut pipeline = callback_pipeline
                            .lock()
                            .expect("pipeline lock poisoned");
                        pipeline.read(data.len() * 4)
                    };
                    for (sample, chunk) in data.iter_mut().zip(bytes.chunks_exact(4)) {
                        *sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    }
                },
                |e| warn!("Audio output stream error: {}", e),
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to open audio output stream: {}", e);
                    return;
                }
            };
            if let Err(e) = stream.play() {
                error!("Failed to start audio output stream: {}", e);
                return;
            }
            debug!(
                "Audio output opened: {} Hz, {} channel(s)",
                spec.sample_rate_hz, spec.channels
            );

            while let Ok(command) = control_rx.recv() {
                match command {
                    SinkCommand::Suspend => {
                        if let Err(e) = stream.pause() {
                            warn!("Failed to pause audio output stream: {}", e);
                        }
                    }
                    SinkCommand::Resume => {
                        if let Err(e) = stream.play() {
                            warn!("Failed to resume audio output stream: {}", e);
                        }
                    }
                    SinkCommand::Stop => break,
                }
            }
            debug!("Audio output closed");
        });

        Ok(())
    }

    fn suspend(&mut self) {
        self.send(SinkCommand::Suspend);
    }

    fn resume(&mut self) {
        self.send(SinkCommand::Resume);
    }

    fn stop(&mut self) {
        self.send(SinkCommand::Stop);
        self.control = None;
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.send(SinkCommand::Stop);
    }
}
