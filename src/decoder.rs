//! Compressed-source decoding into the pipeline buffer.
//!
//! `SymphoniaDecoder` probes a local file or http(s) source, decodes it to
//! interleaved f32 PCM on a worker thread, and feeds the write side of the
//! owning pipeline chunk by chunk. Failures are reported through the
//! pipeline, never propagated.

use std::io::Read;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;

use log::{debug, error, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{MediaError, Result};
use crate::pipeline::AudioStreamPipeline;

/// Asynchronous decoder collaborator feeding a pipeline.
pub trait SourceDecoder: Send {
    /// Begins decoding `source` on a worker, writing PCM into `pipeline`.
    fn start(&mut self, source: &str, pipeline: Arc<Mutex<AudioStreamPipeline>>);
    /// Requests the worker to stop at the next packet boundary.
    fn cancel(&mut self);
}

/// Symphonia-backed decoder.
pub struct SymphoniaDecoder {
    cancel: Arc<AtomicBool>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDecoder for SymphoniaDecoder {
    fn start(&mut self, source: &str, pipeline: Arc<Mutex<AudioStreamPipeline>>) {
        self.cancel.store(false, Ordering::Relaxed);
        let cancel = self.cancel.clone();
        let source = source.to_string();
        thread::spawn(move || {
            if let Err(e) = decode_source(&source, &pipeline, &cancel) {
                error!("Decode of {} failed: {}", source, e);
                let mut pipeline = pipeline.lock().expect("pipeline lock poisoned");
                pipeline.decode_failed(e.to_string());
            }
        });
    }

    fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn open_source(source: &str, pipeline: &Arc<Mutex<AudioStreamPipeline>>) -> Result<Box<dyn MediaSource>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        {
            let mut pipeline = pipeline.lock().expect("pipeline lock poisoned");
            pipeline.buffering();
        }
        let response = ureq::get(source)
            .call()
            .map_err(|e| MediaError::Fetch(e.to_string()))?;
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| MediaError::Fetch(e.to_string()))?;
        debug!("Fetched {} bytes from {}", body.len(), source);
        Ok(Box::new(std::io::Cursor::new(body)))
    } else {
        let path = source.strip_prefix("file://").unwrap_or(source);
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

fn decode_source(
    source: &str,
    pipeline: &Arc<Mutex<AudioStreamPipeline>>,
    cancel: &AtomicBool,
) -> Result<()> {
    let media_source = open_source(source, pipeline)?;
    let media_source_stream = MediaSourceStream::new(media_source, Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = source.rsplit('.').next().filter(|e| e.len() <= 4) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            media_source_stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MediaError::Decode(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader.default_track().ok_or(MediaError::NoTrack)?;
    let track_id = track.id;
    let track_rate = track.codec_params.sample_rate.unwrap_or(0);
    let track_channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let target_spec = {
        let pipeline = pipeline.lock().expect("pipeline lock poisoned");
        pipeline.spec()
    };
    if track_rate != 0 && track_rate != target_spec.sample_rate_hz {
        warn!(
            "Track sample rate {} Hz differs from output {} Hz; playing unresampled",
            track_rate, target_spec.sample_rate_hz
        );
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::Decode(e.to_string()))?;

    debug!(
        "Decoding {}: {} Hz, {} channel(s)",
        source, track_rate, track_channels
    );

    while let Ok(packet) = format_reader.next_packet() {
        if cancel.load(Ordering::Relaxed) {
            debug!("Decode of {} cancelled", source);
            return Ok(());
        }
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buffer.copy_interleaved_ref(decoded);
                let adapted = adapt_channels(
                    sample_buffer.samples(),
                    track_channels,
                    target_spec.channels,
                );
                let mut pipeline = pipeline.lock().expect("pipeline lock poisoned");
                pipeline.write_chunk(&samples_to_bytes(&adapted));
            }
            Err(e) => return Err(MediaError::Decode(e.to_string())),
        }
    }

    let mut pipeline = pipeline.lock().expect("pipeline lock poisoned");
    pipeline.decode_finished();
    Ok(())
}

/// Maps interleaved samples onto the target channel count: mono is
/// duplicated, surplus channels are dropped frame by frame.
fn adapt_channels(samples: &[f32], src_channels: u16, dst_channels: u16) -> Vec<f32> {
    if src_channels == dst_channels || src_channels == 0 {
        return samples.to_vec();
    }
    let src = src_channels as usize;
    let dst = dst_channels as usize;
    let mut out = Vec::with_capacity(samples.len() / src * dst);
    for frame in samples.chunks_exact(src) {
        for channel in 0..dst {
            out.push(frame[channel.min(src - 1)]);
        }
    }
    out
}

fn samples_to_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
