//! Audio decode-and-stream pipeline.
//!
//! Holds the decode buffer between the decoder's write side and the output
//! sink's pull-based read side, and emits state/position/duration/spectrum
//! events as data flows through. Shared behind `Arc<Mutex<_>>` between the
//! decoder worker, the sink callback, and the owning provider.

use log::{debug, warn};
use tokio::sync::broadcast::Sender;

use crate::protocol::{Message, PipelineEvent, PipelineEventKind, PipelineState};
use crate::spectrum::{SampleFormat, SpectrumAnalyzer};

/// PCM format of the decoded stream held in the pipeline buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmSpec {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl PcmSpec {
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    pub fn byte_rate(&self) -> usize {
        self.sample_rate_hz as usize * self.bytes_per_frame()
    }
}

/// Decode buffer plus read cursor, pulled by the output sink.
pub struct AudioStreamPipeline {
    spec: PcmSpec,
    state: PipelineState,
    data: Vec<u8>,
    read_pos: usize,
    decode_finished: bool,
    stalled: bool,
    analyzer: SpectrumAnalyzer,
    bus_sender: Sender<Message>,
    generation: u64,
}

impl AudioStreamPipeline {
    pub fn new(
        spec: PcmSpec,
        analyzer: SpectrumAnalyzer,
        bus_sender: Sender<Message>,
        generation: u64,
    ) -> Self {
        Self {
            spec,
            state: PipelineState::Stopped,
            data: Vec::new(),
            read_pos: 0,
            decode_finished: false,
            stalled: false,
            analyzer,
            bus_sender,
            generation,
        }
    }

    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Resets the buffer and transitions to Playing. The owning provider
    /// starts the decoder feeding `write_chunk` right after.
    pub fn play(&mut self) {
        self.clear();
        self.state = PipelineState::Playing;
        self.emit(PipelineEventKind::StateChanged(self.state));
    }

    /// Halts delivery, clears buffers, and resets the decode-completion
    /// flag.
    pub fn stop(&mut self) {
        self.clear();
        self.state = PipelineState::Stopped;
        self.emit(PipelineEventKind::StateChanged(self.state));
    }

    fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.decode_finished = false;
        self.stalled = false;
    }

    /// Appends decoded bytes on the write side.
    pub fn write_chunk(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        if self.stalled {
            self.stalled = false;
            self.emit(PipelineEventKind::BufferingMedia);
        }
    }

    /// Marks the upstream decode as complete. If everything written has
    /// already been read, the media is fully buffered right now.
    pub fn decode_finished(&mut self) {
        self.decode_finished = true;
        self.emit(PipelineEventKind::DurationChanged(self.duration_ms()));
        if self.read_pos >= self.data.len() {
            self.emit(PipelineEventKind::BufferedMedia);
        }
    }

    /// Reports a remote source still being fetched.
    pub fn buffering(&mut self) {
        self.emit(PipelineEventKind::BufferingMedia);
    }

    /// Records a decoder failure. The pipeline survives; the owning
    /// provider surfaces it as invalid media.
    pub fn decode_failed(&mut self, error: String) {
        warn!("Pipeline decode error: {}", error);
        self.emit(PipelineEventKind::DecodeError(error));
    }

    /// Pull-based read called by the output sink on its own cadence.
    /// Always returns exactly `max_len` bytes, zero-padding whatever the
    /// buffer cannot cover. Returns silence without consuming when not
    /// Playing.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len];
        if self.state != PipelineState::Playing || max_len == 0 {
            return out;
        }

        let available = self.data.len() - self.read_pos;
        let consumed = available.min(max_len);
        out[..consumed].copy_from_slice(&self.data[self.read_pos..self.read_pos + consumed]);
        self.read_pos += consumed;

        self.emit(PipelineEventKind::DataDelivered(consumed));
        if let Some(analyzed) =
            self.analyzer
                .analyze(&out, self.spec.sample_format, self.spec.channels)
        {
            self.emit(PipelineEventKind::SpectrumChanged(analyzed.snapshot));
            self.emit(PipelineEventKind::LevelsChanged {
                left: analyzed.level_left,
                right: analyzed.level_right,
            });
        }
        self.emit(PipelineEventKind::PositionChanged(self.position_ms()));

        if self.at_end() {
            debug!("Pipeline buffer exhausted with decode complete");
            self.stop();
            self.emit(PipelineEventKind::EndOfMedia);
        } else if consumed == 0 && !self.data.is_empty() && !self.stalled {
            // Underrun: the sink outran the decoder.
            self.stalled = true;
            self.emit(PipelineEventKind::StalledMedia);
        }

        out
    }

    /// Repositions the read cursor, truncated to a whole-second boundary
    /// and clamped to the buffered length.
    pub fn seek_ms(&mut self, offset_ms: u64) {
        let aligned_ms = offset_ms - offset_ms % 1_000;
        let bytes = (aligned_ms as usize / 1_000) * self.spec.byte_rate();
        let frame = self.spec.bytes_per_frame();
        let clamped = bytes.min(self.data.len());
        self.read_pos = clamped - clamped % frame;
    }

    pub fn position_ms(&self) -> u64 {
        (self.read_pos * 1_000 / self.spec.byte_rate()) as u64
    }

    pub fn duration_ms(&self) -> u64 {
        (self.data.len() * 1_000 / self.spec.byte_rate()) as u64
    }

    fn at_end(&self) -> bool {
        !self.data.is_empty() && self.read_pos >= self.data.len() && self.decode_finished
    }

    fn emit(&self, kind: PipelineEventKind) {
        let _ = self.bus_sender.send(Message::Pipeline(PipelineEvent {
            generation: self.generation,
            kind,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::{self, Receiver};

    fn test_spec() -> PcmSpec {
        // 1 kHz stereo f32: 8 bytes per frame, 8000 bytes per second.
        PcmSpec {
            sample_rate_hz: 1_000,
            channels: 2,
            sample_format: SampleFormat::F32,
        }
    }

    fn test_pipeline() -> (AudioStreamPipeline, Receiver<Message>) {
        let (bus_sender, receiver) = broadcast::channel(512);
        let analyzer = SpectrumAnalyzer::new(Box::new(|samples: &[f64]| samples.to_vec()));
        (
            AudioStreamPipeline::new(test_spec(), analyzer, bus_sender, 1),
            receiver,
        )
    }

    fn drain(receiver: &mut Receiver<Message>) -> Vec<PipelineEventKind> {
        let mut events = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let Message::Pipeline(event) = message {
                events.push(event.kind);
            }
        }
        events
    }

    #[test]
    fn test_stopped_pipeline_returns_silence_without_consuming() {
        let (mut pipeline, mut receiver) = test_pipeline();
        pipeline.write_chunk(&[1u8; 64]);
        let out = pipeline.read(32);
        assert_eq!(out, vec![0u8; 32]);
        assert_eq!(pipeline.read_pos, 0);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_read_zero_pads_and_reports_position() {
        let (mut pipeline, mut receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&[7u8; 4_000]);
        let out = pipeline.read(8_000);
        assert_eq!(&out[..4_000], &[7u8; 4_000][..]);
        assert_eq!(&out[4_000..], &[0u8; 4_000][..]);
        let events = drain(&mut receiver);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::DataDelivered(4_000))));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::PositionChanged(500))));
    }

    #[test]
    fn test_exhausted_buffer_with_decode_complete_ends_media() {
        let (mut pipeline, mut receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&[1u8; 800]);
        pipeline.decode_finished();
        let _ = pipeline.read(800);
        let events = drain(&mut receiver);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEventKind::StateChanged(PipelineState::Stopped)
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::EndOfMedia)));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn test_decode_completion_after_full_read_reports_buffered() {
        let (mut pipeline, mut receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&[1u8; 160]);
        let _ = pipeline.read(160);
        drain(&mut receiver);
        pipeline.decode_finished();
        let events = drain(&mut receiver);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::DurationChanged(20))));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::BufferedMedia)));
    }

    #[test]
    fn test_seek_truncates_to_whole_seconds() {
        let (mut pipeline, _receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&vec![0u8; 20_000]);
        pipeline.seek_ms(1_499);
        let pos_from_1499 = pipeline.read_pos;
        pipeline.seek_ms(1_000);
        assert_eq!(pipeline.read_pos, pos_from_1499);
        assert_eq!(pipeline.read_pos, 8_000);
    }

    #[test]
    fn test_seek_beyond_buffer_clamps_frame_aligned() {
        let (mut pipeline, _receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&vec![0u8; 8_004]);
        pipeline.seek_ms(90_000);
        assert_eq!(pipeline.read_pos, 8_000);
        assert_eq!(pipeline.read_pos % pipeline.spec().bytes_per_frame(), 0);
    }

    #[test]
    fn test_underrun_stalls_then_buffers_on_new_data() {
        let (mut pipeline, mut receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&[1u8; 80]);
        let _ = pipeline.read(80);
        let _ = pipeline.read(80);
        let events = drain(&mut receiver);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::StalledMedia)));
        pipeline.write_chunk(&[1u8; 80]);
        let events = drain(&mut receiver);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEventKind::BufferingMedia)));
    }

    #[test]
    fn test_play_resets_previous_session() {
        let (mut pipeline, _receiver) = test_pipeline();
        pipeline.play();
        pipeline.write_chunk(&[1u8; 400]);
        pipeline.decode_finished();
        pipeline.play();
        assert_eq!(pipeline.duration_ms(), 0);
        assert_eq!(pipeline.position_ms(), 0);
        assert_eq!(pipeline.state(), PipelineState::Playing);
    }
}
