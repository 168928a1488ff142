//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the
//! orchestrator, the audio pipeline, the providers, and the controller
//! transport, plus the canonical media/playback state enums every provider
//! normalizes into.

use serde::{Deserialize, Serialize};

/// Number of magnitude bins in every published spectrum snapshot.
pub const SPECTRUM_BINS: usize = 20;

/// Content lifecycle state, independent of transport intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaState {
    NoMedia,
    LoadingMedia,
    LoadedMedia,
    StalledMedia,
    BufferingMedia,
    BufferedMedia,
    EndOfMedia,
    InvalidMedia,
}

/// Transport intent for the active media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Which playback provider is active. At most one provider instance exists
/// system-wide at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    None,
    Audio,
    Video,
}

/// Why a provider is being torn down. Consumed only by the orchestrator's
/// post-unload continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadReason {
    MediaFinished,
    MediaChanged,
    MediaStopped,
    ServiceUnloaded,
}

/// Fixed-length magnitude vector published for visualization. Replaced
/// wholesale on every update, never partially mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot(pub [f64; SPECTRUM_BINS]);

impl Default for SpectrumSnapshot {
    fn default() -> Self {
        Self([0.0; SPECTRUM_BINS])
    }
}

/// Mutable track metadata merged field-by-field from incoming updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub thumbnail: String,
    pub repeat: bool,
}

/// Partial metadata update carried by the controller's `set.meta` intent.
/// `track` is an alias that also sets the title.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetadataUpdate {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track: Option<String>,
    pub image: Option<String>,
}

/// Fields answerable through the service-info accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceInfoField {
    LoadedUrl,
    ReceivedUrl,
    Artist,
    Album,
    Title,
    Thumbnail,
    Repeat,
}

/// Value returned by the service-info accessor. Unknown fields yield no
/// value at all rather than a sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceInfoValue {
    Text(String),
    Flag(bool),
}

/// Decode pipeline transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Playing,
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Control(ControlMessage),
    Command(MediaCommand),
    Media(MediaNotification),
    Pipeline(PipelineEvent),
    Video(VideoBackendEvent),
    Timer(TimerEvent),
}

/// Inbound controller intents, already parsed from the wire payload.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    Play { track: String, repeat: bool },
    Pause,
    Stop,
    Resume,
    SetMeta(MetadataUpdate),
}

/// Orchestrator command surface.
#[derive(Debug, Clone)]
pub enum MediaCommand {
    Load { url: String, kind: ProviderKind },
    Stop,
    Pause,
    Resume,
    Restart,
    Seek(u64),
    SyncStates,
    RequestServiceInfo(String),
    RequestPlayMetadata,
    RequestServiceMetadata,
    Next,
    Previous,
    Repeat,
    Shuffle,
}

/// Normalized notifications republished by the orchestrator after every
/// state transition or metadata merge.
#[derive(Debug, Clone)]
pub enum MediaNotification {
    MediaStateChanged(MediaState),
    PlaybackStateChanged(PlaybackState),
    PositionChanged(u64),
    DurationChanged(u64),
    SpectrumChanged(SpectrumSnapshot),
    LevelsChanged { left: f64, right: f64 },
    ProviderChanged(ProviderKind),
    AudioProviderUnloaded,
    VideoProviderUnloaded,
    ServiceInfo {
        key: String,
        value: Option<ServiceInfoValue>,
    },
    /// Only the non-empty metadata fields, for display surfaces.
    PlayMetadata(serde_json::Value),
    /// The full metadata map including the loaded and received urls.
    ServiceMetadata(serde_json::Value),
    LoadRequested,
    MetadataReceived,
    PauseRequested,
    StopRequested,
    ResumeRequested,
}

/// Event emitted by the audio decode pipeline. The generation stamps which
/// provider activation produced it; the orchestrator discards events whose
/// generation no longer matches the live provider.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub generation: u64,
    pub kind: PipelineEventKind,
}

#[derive(Debug, Clone)]
pub enum PipelineEventKind {
    StateChanged(PipelineState),
    DataDelivered(usize),
    PositionChanged(u64),
    DurationChanged(u64),
    SpectrumChanged(SpectrumSnapshot),
    LevelsChanged { left: f64, right: f64 },
    StalledMedia,
    BufferingMedia,
    BufferedMedia,
    EndOfMedia,
    DecodeError(String),
}

/// Native status reported by the opaque video rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    NoMedia,
    Opening,
    Loaded,
    Stalled,
    Buffering,
    Buffered,
    Ended,
    Invalid,
}

/// Native transport state reported by the video backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTransport {
    Playing,
    Paused,
    Stopped,
}

/// Event emitted by the video backend adapter, generation-stamped like
/// pipeline events.
#[derive(Debug, Clone)]
pub struct VideoBackendEvent {
    pub generation: u64,
    pub kind: VideoBackendEventKind,
}

#[derive(Debug, Clone)]
pub enum VideoBackendEventKind {
    Status(BackendStatus),
    Transport(BackendTransport),
    Position(u64),
    Duration(u64),
}

/// Deferred continuations posted back onto the bus by sleeper timers.
/// Each carries the generation of the operation that scheduled it so a
/// superseded continuation discards itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    UnloadGraceElapsed { generation: u64 },
    ActivationDue { generation: u64 },
    InvalidMediaGraceElapsed { generation: u64 },
}
