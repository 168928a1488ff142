//! Audio playback provider.
//!
//! Owns one decode pipeline and an output sink, and translates pipeline
//! events into the canonical (MediaState, PlaybackState) pair.

use std::sync::{Arc, Mutex};

use log::warn;
use tokio::sync::broadcast::Sender;

use crate::decoder::SourceDecoder;
use crate::pipeline::{AudioStreamPipeline, PcmSpec};
use crate::protocol::{
    MediaState, Message, PipelineEventKind, PlaybackState, TimerEvent,
};
use crate::providers::ProviderSignal;
use crate::sink::AudioSink;
use crate::spectrum::SpectrumAnalyzer;

pub struct AudioProvider {
    pipeline: Arc<Mutex<AudioStreamPipeline>>,
    sink: Box<dyn AudioSink>,
    decoder: Box<dyn SourceDecoder>,
    media_state: MediaState,
    playback_state: PlaybackState,
    current_url: String,
    generation: u64,
    invalid_media_grace_ms: u64,
    sink_started: bool,
}

impl AudioProvider {
    pub fn new(
        spec: PcmSpec,
        analyzer: SpectrumAnalyzer,
        sink: Box<dyn AudioSink>,
        decoder: Box<dyn SourceDecoder>,
        bus_sender: Sender<Message>,
        generation: u64,
        invalid_media_grace_ms: u64,
    ) -> Self {
        let pipeline = Arc::new(Mutex::new(AudioStreamPipeline::new(
            spec, analyzer, bus_sender, generation,
        )));
        Self {
            pipeline,
            sink,
            decoder,
            media_state: MediaState::NoMedia,
            playback_state: PlaybackState::Stopped,
            current_url: String::new(),
            generation,
            invalid_media_grace_ms,
            sink_started: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_state(&self) -> (MediaState, PlaybackState) {
        (self.media_state, self.playback_state)
    }

    /// Starts playing `url`: fresh pipeline session, sink pulling, decoder
    /// feeding. Audio output begins essentially synchronously, so Loaded
    /// and Playing follow Loading immediately.
    pub fn play(&mut self, url: &str) -> Vec<ProviderSignal> {
        self.current_url = url.to_string();
        self.media_state = MediaState::LoadingMedia;
        let mut signals = vec![ProviderSignal::Media(self.media_state)];

        if !self.sink_started {
            match self.sink.start(self.pipeline.clone()) {
                Ok(()) => self.sink_started = true,
                Err(e) => warn!("Audio sink could not be started: {}", e),
            }
        }
        {
            let mut pipeline = self.pipeline.lock().expect("pipeline lock poisoned");
            pipeline.play();
        }
        self.decoder.start(url, self.pipeline.clone());

        // Loaded and Playing are reported only with a live output sink.
        if self.sink_started {
            self.media_state = MediaState::LoadedMedia;
            self.playback_state = PlaybackState::Playing;
            signals.push(ProviderSignal::Media(self.media_state));
            signals.push(ProviderSignal::Playback(self.playback_state));
        }
        signals
    }

    pub fn pause(&mut self) -> Vec<ProviderSignal> {
        self.sink.suspend();
        self.playback_state = PlaybackState::Paused;
        vec![ProviderSignal::Playback(self.playback_state)]
    }

    pub fn resume(&mut self) -> Vec<ProviderSignal> {
        self.sink.resume();
        self.playback_state = PlaybackState::Playing;
        vec![ProviderSignal::Playback(self.playback_state)]
    }

    pub fn stop(&mut self) -> Vec<ProviderSignal> {
        self.decoder.cancel();
        {
            let mut pipeline = self.pipeline.lock().expect("pipeline lock poisoned");
            pipeline.stop();
        }
        self.sink.stop();
        self.sink_started = false;
        self.playback_state = PlaybackState::Stopped;
        self.media_state = MediaState::NoMedia;
        vec![
            ProviderSignal::Playback(self.playback_state),
            ProviderSignal::Media(self.media_state),
        ]
    }

    /// Replays the current url. The previous decode worker is cancelled
    /// first so it cannot interleave writes into the fresh session.
    pub fn restart(&mut self) -> Vec<ProviderSignal> {
        self.decoder.cancel();
        let url = self.current_url.clone();
        self.play(&url)
    }

    /// Seeks to a second-aligned offset. The sink is suspended around the
    /// cursor move so the callback never reads a half-updated position.
    pub fn seek(&mut self, offset_ms: u64) -> Vec<ProviderSignal> {
        self.sink.suspend();
        {
            let mut pipeline = self.pipeline.lock().expect("pipeline lock poisoned");
            pipeline.seek_ms(offset_ms);
        }
        self.sink.resume();
        Vec::new()
    }

    /// Re-emits the current state pair on demand.
    pub fn sync_states(&self) -> Vec<ProviderSignal> {
        vec![
            ProviderSignal::Playback(self.playback_state),
            ProviderSignal::Media(self.media_state),
        ]
    }

    /// Normalizes one pipeline event. `schedule` posts a deferred
    /// continuation message back onto the bus.
    pub fn handle_pipeline_event(
        &mut self,
        event: PipelineEventKind,
        schedule: &dyn Fn(u64, Message),
    ) -> Vec<ProviderSignal> {
        match event {
            PipelineEventKind::StateChanged(_) | PipelineEventKind::DataDelivered(_) => Vec::new(),
            PipelineEventKind::PositionChanged(position) => {
                vec![ProviderSignal::Position(position)]
            }
            PipelineEventKind::DurationChanged(duration) => {
                vec![ProviderSignal::Duration(duration)]
            }
            PipelineEventKind::SpectrumChanged(snapshot) => {
                vec![ProviderSignal::Spectrum(snapshot)]
            }
            PipelineEventKind::LevelsChanged { left, right } => {
                vec![ProviderSignal::Levels { left, right }]
            }
            PipelineEventKind::StalledMedia => {
                self.media_state = MediaState::StalledMedia;
                vec![ProviderSignal::Media(self.media_state)]
            }
            PipelineEventKind::BufferingMedia => {
                self.media_state = MediaState::BufferingMedia;
                vec![ProviderSignal::Media(self.media_state)]
            }
            PipelineEventKind::BufferedMedia => {
                if self.media_state == MediaState::NoMedia {
                    return Vec::new();
                }
                self.media_state = MediaState::BufferedMedia;
                vec![ProviderSignal::Media(self.media_state)]
            }
            PipelineEventKind::EndOfMedia => {
                self.media_state = MediaState::EndOfMedia;
                vec![ProviderSignal::Media(self.media_state)]
            }
            PipelineEventKind::DecodeError(error) => {
                warn!("Audio provider suspending on decode error: {}", error);
                self.sink.suspend();
                self.media_state = MediaState::InvalidMedia;
                schedule(
                    self.invalid_media_grace_ms,
                    Message::Timer(TimerEvent::InvalidMediaGraceElapsed {
                        generation: self.generation,
                    }),
                );
                vec![ProviderSignal::Media(self.media_state)]
            }
        }
    }

    /// Completes invalid-media handling after the grace period let any
    /// in-flight sink callback drain.
    pub fn finish_invalid_media(&mut self) -> Vec<ProviderSignal> {
        self.decoder.cancel();
        {
            let mut pipeline = self.pipeline.lock().expect("pipeline lock poisoned");
            pipeline.stop();
        }
        self.sink.stop();
        self.sink_started = false;
        self.playback_state = PlaybackState::Stopped;
        vec![ProviderSignal::Playback(self.playback_state)]
    }

    /// Releases the pipeline and sink at the end of the teardown
    /// continuation.
    pub fn teardown(&mut self) {
        self.decoder.cancel();
        {
            let mut pipeline = self.pipeline.lock().expect("pipeline lock poisoned");
            pipeline.stop();
        }
        self.sink.stop();
        self.sink_started = false;
    }
}
