//! Media orchestration service.
//!
//! Owns at most one active playback provider, serializes provider
//! switches, normalizes provider state into the shared
//! (MediaState, PlaybackState) pair, and republishes every transition to
//! the remote controller. Runs as a single event loop over the bus; the
//! only suspension points are the teardown grace delays and the wait for
//! an in-flight unload, both realized as deferred continuation messages.

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde_json::{json, Value};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::config::Config;
use crate::controller::{
    ControllerLink, MSG_GET_NEXT, MSG_GET_PREVIOUS, MSG_GET_REPEAT, MSG_GET_SHUFFLE,
    MSG_MEDIA_STATUS, MSG_PLAYBACK_SYNC,
};
use crate::decoder::SourceDecoder;
use crate::pipeline::PcmSpec;
use crate::protocol::{
    ControlMessage, MediaCommand, MediaNotification, MediaState, Message, PlaybackState,
    ProviderKind, ServiceInfoField, ServiceInfoValue, TimerEvent, TrackMetadata, UnloadReason,
    VideoBackendEvent,
};
use crate::providers::{
    audio_provider::AudioProvider,
    video_provider::{VideoBackend, VideoProvider},
    ActiveProvider, ProviderSignal,
};
use crate::reachability::UrlValidator;
use crate::sink::AudioSink;
use crate::spectrum::SpectrumAnalyzer;

/// Posts a message onto the bus after a delay. The production scheduler
/// spawns a sleeper thread; tests capture the continuations instead.
pub type Scheduler = Box<dyn Fn(u64, Message) + Send>;

pub type SinkFactory = Box<dyn Fn() -> Box<dyn AudioSink> + Send>;
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn SourceDecoder> + Send>;
pub type VideoBackendFactory = Box<dyn Fn() -> Box<dyn VideoBackend> + Send>;

/// Sleeper-thread scheduler delivering continuations through the bus.
pub fn bus_scheduler(bus_sender: Sender<Message>) -> Scheduler {
    Box::new(move |delay_ms, message| {
        let sender = bus_sender.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            let _ = sender.send(message);
        });
    })
}

/// Collaborators injected into the orchestrator at construction.
pub struct OrchestratorContext {
    pub bus_receiver: Receiver<Message>,
    pub bus_sender: Sender<Message>,
    pub controller: Box<dyn ControllerLink>,
    pub url_validator: UrlValidator,
    pub sink_factory: SinkFactory,
    pub decoder_factory: DecoderFactory,
    pub video_backend_factory: VideoBackendFactory,
    pub scheduler: Scheduler,
    pub config: Config,
}

struct UnloadTicket {
    generation: u64,
    reason: UnloadReason,
}

pub struct MediaOrchestrator {
    bus_receiver: Receiver<Message>,
    bus_sender: Sender<Message>,
    controller: Box<dyn ControllerLink>,
    url_validator: UrlValidator,
    sink_factory: SinkFactory,
    decoder_factory: DecoderFactory,
    video_backend_factory: VideoBackendFactory,
    scheduler: Scheduler,
    config: Config,

    media_state: MediaState,
    playback_state: PlaybackState,
    active: ActiveProvider,
    selected_kind: ProviderKind,
    /// Generation whose pipeline/backend events are currently accepted.
    /// Zero means severed: events from a dying provider no longer reach
    /// the orchestrator.
    live_generation: u64,
    generation_counter: u64,
    pending_unload: Option<UnloadTicket>,
    pending_load: Option<ProviderKind>,
    pending_activation: Option<u64>,

    loaded_url: String,
    received_url: String,
    metadata: TrackMetadata,
}

impl MediaOrchestrator {
    pub fn new(context: OrchestratorContext) -> Self {
        let OrchestratorContext {
            bus_receiver,
            bus_sender,
            controller,
            url_validator,
            sink_factory,
            decoder_factory,
            video_backend_factory,
            scheduler,
            config,
        } = context;
        Self {
            bus_receiver,
            bus_sender,
            controller,
            url_validator,
            sink_factory,
            decoder_factory,
            video_backend_factory,
            scheduler,
            config,
            media_state: MediaState::NoMedia,
            playback_state: PlaybackState::Stopped,
            active: ActiveProvider::None,
            selected_kind: ProviderKind::None,
            live_generation: 0,
            generation_counter: 0,
            pending_unload: None,
            pending_load: None,
            pending_activation: None,
            loaded_url: String::new(),
            received_url: String::new(),
            metadata: TrackMetadata::default(),
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_receiver.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Orchestrator lagged on control bus, skipped {} message(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Control(control) => self.handle_control(control),
            Message::Command(command) => self.handle_command(command),
            Message::Pipeline(event) => self.handle_pipeline_event(event.generation, event.kind),
            Message::Video(event) => self.handle_video_event(event),
            Message::Timer(timer) => self.handle_timer(timer),
            Message::Media(_) => {}
        }
    }

    fn handle_control(&mut self, control: ControlMessage) {
        match control {
            ControlMessage::Play { track, repeat } => {
                self.received_url = track;
                self.metadata.repeat = repeat;
                self.emit(MediaNotification::LoadRequested);
            }
            ControlMessage::Pause => {
                self.media_pause();
                self.emit(MediaNotification::PauseRequested);
            }
            ControlMessage::Stop => {
                self.media_stop();
                self.emit(MediaNotification::StopRequested);
            }
            ControlMessage::Resume => {
                self.media_continue();
                self.emit(MediaNotification::ResumeRequested);
            }
            ControlMessage::SetMeta(update) => {
                self.metadata.merge_from(&update);
                self.emit(MediaNotification::MetadataReceived);
            }
        }
    }

    fn handle_command(&mut self, command: MediaCommand) {
        match command {
            MediaCommand::Load { url, kind } => self.media_load_url(url, kind),
            MediaCommand::Stop => self.media_stop(),
            MediaCommand::Pause => self.media_pause(),
            MediaCommand::Resume => self.media_continue(),
            MediaCommand::Restart => self.media_restart(),
            MediaCommand::Seek(offset_ms) => self.media_seek(offset_ms),
            MediaCommand::SyncStates => self.sync_states(),
            MediaCommand::RequestServiceInfo(key) => {
                let value = self.service_info(&key);
                self.emit(MediaNotification::ServiceInfo { key, value });
            }
            MediaCommand::RequestPlayMetadata => {
                let metadata = self.common_play_metadata();
                self.emit(MediaNotification::PlayMetadata(metadata));
            }
            MediaCommand::RequestServiceMetadata => {
                let metadata = self.service_metadata();
                self.emit(MediaNotification::ServiceMetadata(metadata));
            }
            MediaCommand::Next => self.controller.send_request(MSG_GET_NEXT, json!({})),
            MediaCommand::Previous => self.controller.send_request(MSG_GET_PREVIOUS, json!({})),
            MediaCommand::Repeat => self.controller.send_request(MSG_GET_REPEAT, json!({})),
            MediaCommand::Shuffle => self.controller.send_request(MSG_GET_SHUFFLE, json!({})),
        }
    }

    fn handle_pipeline_event(&mut self, generation: u64, kind: crate::protocol::PipelineEventKind) {
        if self.live_generation == 0 || generation != self.live_generation {
            return;
        }
        let scheduler = self.scheduler.as_ref();
        let signals = if let ActiveProvider::Audio(provider) = &mut self.active {
            provider.handle_pipeline_event(kind, scheduler)
        } else {
            Vec::new()
        };
        self.apply_signals(signals);
    }

    fn handle_video_event(&mut self, event: VideoBackendEvent) {
        if self.live_generation == 0 || event.generation != self.live_generation {
            return;
        }
        let signals = if let ActiveProvider::Video(provider) = &mut self.active {
            provider.handle_backend_event(event.kind)
        } else {
            Vec::new()
        };
        self.apply_signals(signals);
    }

    fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::UnloadGraceElapsed { generation } => self.finish_audio_unload(generation),
            TimerEvent::ActivationDue { generation } => self.activate(generation),
            TimerEvent::InvalidMediaGraceElapsed { generation } => {
                if generation != self.live_generation {
                    return;
                }
                let signals = self.with_audio(|provider| provider.finish_invalid_media());
                self.apply_signals(signals);
            }
        }
    }

    // ---- operation contracts -------------------------------------------

    fn media_load_url(&mut self, url: String, kind: ProviderKind) {
        if kind == ProviderKind::None {
            return;
        }
        if kind == ProviderKind::Audio && !(self.url_validator)(&url) {
            // Transient failure pulse; the active provider is untouched and
            // the controller sees the final NoMedia.
            warn!("Rejecting unplayable url {}", url);
            self.media_state = MediaState::InvalidMedia;
            self.emit(MediaNotification::MediaStateChanged(self.media_state));
            self.media_state = MediaState::NoMedia;
            self.emit(MediaNotification::MediaStateChanged(self.media_state));
            self.sync_media_state_to_controller();
            return;
        }
        self.loaded_url = url;
        self.request_switch(kind);
    }

    fn media_stop(&mut self) {
        if self.pending_unload.is_some() {
            return;
        }
        // A stop supersedes a load whose activation is still pending.
        if self.pending_activation.take().is_some() {
            debug!("Stop superseded a pending load");
        }
        match self.active.kind() {
            ProviderKind::Audio => {
                if self.playback_state == PlaybackState::Stopped {
                    return;
                }
                // Pause before teardown to avoid an audible artifact.
                let signals = self.with_audio(|provider| provider.pause());
                self.apply_signals(signals);
                self.begin_audio_unload(UnloadReason::MediaStopped);
            }
            ProviderKind::Video => {
                let signals = self.with_video(|provider| provider.stop());
                self.apply_signals(signals);
            }
            ProviderKind::None => {}
        }
    }

    fn media_pause(&mut self) {
        if self.pending_unload.is_some() {
            return;
        }
        let signals = match self.active.kind() {
            ProviderKind::Audio => self.with_audio(|provider| provider.pause()),
            ProviderKind::Video => self.with_video(|provider| provider.pause()),
            ProviderKind::None => return,
        };
        self.apply_signals(signals);
    }

    fn media_continue(&mut self) {
        if self.pending_unload.is_some() {
            return;
        }
        let signals = match self.active.kind() {
            ProviderKind::Audio => self.with_audio(|provider| provider.resume()),
            ProviderKind::Video => self.with_video(|provider| provider.resume()),
            ProviderKind::None => return,
        };
        self.apply_signals(signals);
    }

    fn media_restart(&mut self) {
        if self.pending_unload.is_some() {
            return;
        }
        match self.active.kind() {
            ProviderKind::Audio => {
                // Full reload of the last url rather than a pipeline rewind.
                let url = self.loaded_url.clone();
                self.media_load_url(url, ProviderKind::Audio);
            }
            ProviderKind::Video => {
                let signals = self.with_video(|provider| provider.restart());
                self.apply_signals(signals);
            }
            ProviderKind::None => {}
        }
    }

    fn media_seek(&mut self, offset_ms: u64) {
        if self.pending_unload.is_some() {
            return;
        }
        match self.active.kind() {
            ProviderKind::Audio => {
                self.media_continue();
                let signals = self.with_audio(|provider| provider.seek(offset_ms));
                self.apply_signals(signals);
            }
            ProviderKind::Video => {
                let signals = self.with_video(|provider| provider.seek(offset_ms));
                self.apply_signals(signals);
            }
            ProviderKind::None => {}
        }
    }

    /// Re-emits the current state pair on demand, bypassing duplicate
    /// suppression.
    fn sync_states(&mut self) {
        let signals = match self.active.kind() {
            ProviderKind::Audio => self.with_audio(|provider| provider.sync_states()),
            ProviderKind::Video => self.with_video(|provider| provider.sync_states()),
            ProviderKind::None => return,
        };
        for signal in signals {
            match signal {
                ProviderSignal::Playback(state) => {
                    self.playback_state = state;
                    self.emit(MediaNotification::PlaybackStateChanged(state));
                    self.sync_playback_state_to_controller();
                }
                ProviderSignal::Media(state) => {
                    self.media_state = state;
                    self.emit(MediaNotification::MediaStateChanged(state));
                    self.sync_media_state_to_controller();
                }
                _ => {}
            }
        }
    }

    fn service_info(&self, key: &str) -> Option<ServiceInfoValue> {
        let field = ServiceInfoField::from_key(key)?;
        Some(match field {
            ServiceInfoField::LoadedUrl => ServiceInfoValue::Text(self.loaded_url.clone()),
            ServiceInfoField::ReceivedUrl => ServiceInfoValue::Text(self.received_url.clone()),
            ServiceInfoField::Artist => ServiceInfoValue::Text(self.metadata.artist.clone()),
            ServiceInfoField::Album => ServiceInfoValue::Text(self.metadata.album.clone()),
            ServiceInfoField::Title => ServiceInfoValue::Text(self.metadata.title.clone()),
            ServiceInfoField::Thumbnail => ServiceInfoValue::Text(self.metadata.thumbnail.clone()),
            ServiceInfoField::Repeat => ServiceInfoValue::Flag(self.metadata.repeat),
        })
    }

    /// Display metadata with blank fields left out entirely.
    fn common_play_metadata(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, value) in [
            ("artist", &self.metadata.artist),
            ("album", &self.metadata.album),
            ("title", &self.metadata.title),
            ("thumbnail", &self.metadata.thumbnail),
        ] {
            if !value.is_empty() {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        map.insert("repeat".to_string(), Value::Bool(self.metadata.repeat));
        Value::Object(map)
    }

    fn service_metadata(&self) -> Value {
        json!({
            "artist": self.metadata.artist,
            "album": self.metadata.album,
            "title": self.metadata.title,
            "thumbnail": self.metadata.thumbnail,
            "repeat": self.metadata.repeat,
            "loadedUrl": self.loaded_url,
            "receivedUrl": self.received_url,
        })
    }

    // ---- switch protocol -----------------------------------------------

    fn request_switch(&mut self, kind: ProviderKind) {
        if self.pending_unload.is_some() {
            // Serialized: the new switch waits for the in-flight unload's
            // completion continuation. Latest request wins.
            debug!("Switch to {:?} deferred until unload completes", kind);
            self.pending_load = Some(kind);
            return;
        }
        match (self.active.kind(), kind) {
            (ProviderKind::Audio, _) => {
                let reason = if kind == ProviderKind::Audio {
                    UnloadReason::MediaChanged
                } else {
                    UnloadReason::ServiceUnloaded
                };
                self.pending_load = Some(kind);
                self.begin_audio_unload(reason);
            }
            (ProviderKind::Video, ProviderKind::Video) => {
                // Same kind: restart the load on the live provider.
                self.schedule_activation(kind);
            }
            (ProviderKind::Video, _) => {
                self.unload_video();
                self.schedule_activation(kind);
            }
            (ProviderKind::None, _) => self.schedule_activation(kind),
        }
    }

    fn schedule_activation(&mut self, kind: ProviderKind) {
        if self.selected_kind != kind {
            self.selected_kind = kind;
            self.emit(MediaNotification::ProviderChanged(kind));
        }
        let generation = self.next_generation();
        self.pending_activation = Some(generation);
        (self.scheduler)(
            self.config.timing.activation_delay_ms,
            Message::Timer(TimerEvent::ActivationDue { generation }),
        );
    }

    fn activate(&mut self, generation: u64) {
        if self.pending_activation != Some(generation) {
            debug!("Discarding stale activation (generation {})", generation);
            return;
        }
        self.pending_activation = None;
        let url = self.loaded_url.clone();
        match self.selected_kind {
            ProviderKind::Audio => {
                let spec = PcmSpec {
                    sample_rate_hz: self.config.output.sample_rate_hz,
                    channels: self.config.output.channel_count,
                    sample_format: self.config.sample_format(),
                };
                let mut provider = AudioProvider::new(
                    spec,
                    SpectrumAnalyzer::with_fft(),
                    (self.sink_factory)(),
                    (self.decoder_factory)(),
                    self.bus_sender.clone(),
                    generation,
                    self.config.timing.invalid_media_grace_ms,
                );
                self.live_generation = generation;
                let signals = provider.play(&url);
                self.active = ActiveProvider::Audio(provider);
                self.apply_signals(signals);
            }
            ProviderKind::Video => {
                if !matches!(self.active, ActiveProvider::Video(_)) {
                    let provider =
                        VideoProvider::new((self.video_backend_factory)(), generation);
                    self.live_generation = generation;
                    self.active = ActiveProvider::Video(provider);
                }
                let signals = self.with_video(|provider| provider.play(&url));
                self.apply_signals(signals);
            }
            ProviderKind::None => {}
        }
    }

    fn begin_audio_unload(&mut self, reason: UnloadReason) {
        if !matches!(self.active, ActiveProvider::Audio(_)) {
            return;
        }
        debug!("Unloading audio provider ({:?})", reason);
        let generation = self.next_generation();
        self.pending_unload = Some(UnloadTicket { generation, reason });
        // Sever the dying provider's event channels before teardown begins.
        self.live_generation = 0;
        (self.scheduler)(
            self.config.timing.unload_grace_ms,
            Message::Timer(TimerEvent::UnloadGraceElapsed { generation }),
        );
    }

    fn finish_audio_unload(&mut self, generation: u64) {
        let ticket = match self.pending_unload.take() {
            Some(ticket) if ticket.generation == generation => ticket,
            other => {
                self.pending_unload = other;
                return;
            }
        };
        if let ActiveProvider::Audio(mut provider) = self.active.take() {
            provider.teardown();
        }
        match ticket.reason {
            UnloadReason::MediaFinished => self.set_media_state(MediaState::EndOfMedia),
            UnloadReason::ServiceUnloaded => {
                self.selected_kind = ProviderKind::None;
            }
            UnloadReason::MediaStopped => {
                self.emit(MediaNotification::PositionChanged(0));
                self.emit(MediaNotification::DurationChanged(0));
                self.set_playback_state(PlaybackState::Stopped);
                self.set_media_state(MediaState::NoMedia);
            }
            UnloadReason::MediaChanged => {}
        }
        self.emit(MediaNotification::AudioProviderUnloaded);
        if let Some(kind) = self.pending_load.take() {
            self.request_switch(kind);
        }
    }

    fn unload_video(&mut self) {
        if let ActiveProvider::Video(mut provider) = self.active.take() {
            provider.teardown();
            self.emit(MediaNotification::VideoProviderUnloaded);
        }
    }

    // ---- normalization -------------------------------------------------

    fn apply_signals(&mut self, signals: Vec<ProviderSignal>) {
        for signal in signals {
            match signal {
                ProviderSignal::Media(MediaState::EndOfMedia) => self.provider_end_of_media(),
                ProviderSignal::Media(state) => self.set_media_state(state),
                ProviderSignal::Playback(state) => self.set_playback_state(state),
                ProviderSignal::Position(position) => {
                    self.emit(MediaNotification::PositionChanged(position));
                }
                ProviderSignal::Duration(duration) => {
                    self.emit(MediaNotification::DurationChanged(duration));
                }
                ProviderSignal::Spectrum(snapshot) => {
                    self.emit(MediaNotification::SpectrumChanged(snapshot));
                }
                ProviderSignal::Levels { left, right } => {
                    self.emit(MediaNotification::LevelsChanged { left, right });
                }
            }
        }
    }

    /// End-of-media normalization differs by provider: audio reaches its
    /// final EndOfMedia only after an unload-driven teardown, video enters
    /// the raw state immediately and then stops.
    fn provider_end_of_media(&mut self) {
        match self.active.kind() {
            ProviderKind::Audio => {
                if self.pending_unload.is_none() {
                    self.begin_audio_unload(UnloadReason::MediaFinished);
                }
            }
            ProviderKind::Video => {
                self.set_media_state(MediaState::EndOfMedia);
                let signals = self.with_video(|provider| provider.stop());
                self.apply_signals(signals);
            }
            ProviderKind::None => {}
        }
    }

    /// Duplicate emissions are suppressed: a normalization pass that does
    /// not change the value emits nothing.
    fn set_media_state(&mut self, state: MediaState) {
        if self.media_state == state {
            return;
        }
        self.media_state = state;
        self.emit(MediaNotification::MediaStateChanged(state));
        self.sync_media_state_to_controller();
    }

    fn set_playback_state(&mut self, state: PlaybackState) {
        if self.playback_state == state {
            return;
        }
        self.playback_state = state;
        self.emit(MediaNotification::PlaybackStateChanged(state));
        self.sync_playback_state_to_controller();
    }

    fn sync_media_state_to_controller(&self) {
        self.controller.send_request(
            MSG_MEDIA_STATUS,
            json!({ "status": enum_value(&self.media_state) }),
        );
    }

    fn sync_playback_state_to_controller(&self) {
        self.controller.send_request(
            MSG_PLAYBACK_SYNC,
            json!({ "state": enum_value(&self.playback_state) }),
        );
    }

    fn emit(&self, notification: MediaNotification) {
        let _ = self.bus_sender.send(Message::Media(notification));
    }

    fn next_generation(&mut self) -> u64 {
        self.generation_counter += 1;
        self.generation_counter
    }

    fn with_audio(
        &mut self,
        f: impl FnOnce(&mut AudioProvider) -> Vec<ProviderSignal>,
    ) -> Vec<ProviderSignal> {
        if let ActiveProvider::Audio(provider) = &mut self.active {
            f(provider)
        } else {
            Vec::new()
        }
    }

    fn with_video(
        &mut self,
        f: impl FnOnce(&mut VideoProvider) -> Vec<ProviderSignal>,
    ) -> Vec<ProviderSignal> {
        if let ActiveProvider::Video(provider) = &mut self.active {
            f(provider)
        } else {
            Vec::new()
        }
    }

    #[cfg(test)]
    pub(crate) fn live_generation(&self) -> u64 {
        self.live_generation
    }

    #[cfg(test)]
    pub(crate) fn current_state(&self) -> (ProviderKind, MediaState, PlaybackState) {
        (self.active.kind(), self.media_state, self.playback_state)
    }
}

fn enum_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
