//! Video playback provider.
//!
//! Thin normalization layer over an opaque rendering backend: commands are
//! delegated, and the backend's native status vocabulary is mapped 1:1 onto
//! the canonical state pair. No spectrum, no custom buffering.

use log::info;

use crate::protocol::{
    BackendStatus, BackendTransport, MediaState, PlaybackState, VideoBackendEventKind,
};
use crate::providers::ProviderSignal;

/// Opaque video rendering backend collaborator. The real renderer binds
/// its own output surface; state flows back as generation-stamped
/// `VideoBackendEvent`s on the bus.
pub trait VideoBackend: Send {
    fn play(&mut self, url: &str);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn rewind(&mut self);
    fn seek(&mut self, offset_ms: u64);
}

/// Logging stand-in used when no renderer is wired in.
pub struct NullVideoBackend;

impl VideoBackend for NullVideoBackend {
    fn play(&mut self, url: &str) {
        info!("Video backend: play {}", url);
    }
    fn pause(&mut self) {
        info!("Video backend: pause");
    }
    fn resume(&mut self) {
        info!("Video backend: resume");
    }
    fn stop(&mut self) {
        info!("Video backend: stop");
    }
    fn rewind(&mut self) {
        info!("Video backend: rewind");
    }
    fn seek(&mut self, offset_ms: u64) {
        info!("Video backend: seek to {} ms", offset_ms);
    }
}

pub struct VideoProvider {
    backend: Box<dyn VideoBackend>,
    media_state: MediaState,
    playback_state: PlaybackState,
    generation: u64,
}

impl VideoProvider {
    pub fn new(backend: Box<dyn VideoBackend>, generation: u64) -> Self {
        Self {
            backend,
            media_state: MediaState::NoMedia,
            playback_state: PlaybackState::Stopped,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_state(&self) -> (MediaState, PlaybackState) {
        (self.media_state, self.playback_state)
    }

    pub fn play(&mut self, url: &str) -> Vec<ProviderSignal> {
        self.backend.play(url);
        self.media_state = MediaState::LoadingMedia;
        vec![ProviderSignal::Media(self.media_state)]
    }

    pub fn pause(&mut self) -> Vec<ProviderSignal> {
        self.backend.pause();
        Vec::new()
    }

    pub fn resume(&mut self) -> Vec<ProviderSignal> {
        self.backend.resume();
        Vec::new()
    }

    pub fn stop(&mut self) -> Vec<ProviderSignal> {
        self.backend.stop();
        Vec::new()
    }

    /// Restart delegates to the backend's rewind-to-zero rather than a
    /// full reload.
    pub fn restart(&mut self) -> Vec<ProviderSignal> {
        self.backend.rewind();
        Vec::new()
    }

    pub fn seek(&mut self, offset_ms: u64) -> Vec<ProviderSignal> {
        self.backend.seek(offset_ms);
        Vec::new()
    }

    pub fn sync_states(&self) -> Vec<ProviderSignal> {
        vec![
            ProviderSignal::Playback(self.playback_state),
            ProviderSignal::Media(self.media_state),
        ]
    }

    pub fn handle_backend_event(&mut self, event: VideoBackendEventKind) -> Vec<ProviderSignal> {
        match event {
            VideoBackendEventKind::Status(status) => {
                self.media_state = map_status(status);
                vec![ProviderSignal::Media(self.media_state)]
            }
            VideoBackendEventKind::Transport(transport) => {
                self.playback_state = map_transport(transport);
                vec![ProviderSignal::Playback(self.playback_state)]
            }
            VideoBackendEventKind::Position(position) => {
                vec![ProviderSignal::Position(position)]
            }
            VideoBackendEventKind::Duration(duration) => {
                vec![ProviderSignal::Duration(duration)]
            }
        }
    }

    pub fn teardown(&mut self) {
        if self.playback_state != PlaybackState::Stopped {
            self.backend.stop();
        }
    }
}

fn map_status(status: BackendStatus) -> MediaState {
    match status {
        BackendStatus::NoMedia => MediaState::NoMedia,
        BackendStatus::Opening => MediaState::LoadingMedia,
        BackendStatus::Loaded => MediaState::LoadedMedia,
        BackendStatus::Stalled => MediaState::StalledMedia,
        BackendStatus::Buffering => MediaState::BufferingMedia,
        BackendStatus::Buffered => MediaState::BufferedMedia,
        BackendStatus::Ended => MediaState::EndOfMedia,
        BackendStatus::Invalid => MediaState::InvalidMedia,
    }
}

fn map_transport(transport: BackendTransport) -> PlaybackState {
    match transport {
        BackendTransport::Playing => PlaybackState::Playing,
        BackendTransport::Paused => PlaybackState::Paused,
        BackendTransport::Stopped => PlaybackState::Stopped,
    }
}
