//! Playback providers (audio pipeline, video backend) and the tagged
//! active-provider slot owned by the orchestrator.

pub(crate) mod audio_provider;
pub(crate) mod video_provider;

use crate::protocol::{MediaState, PlaybackState, ProviderKind, SpectrumSnapshot};
use audio_provider::AudioProvider;
use video_provider::VideoProvider;

/// Normalized update produced by a provider for the orchestrator to
/// republish. Providers report canonical states directly; there is no
/// per-provider state vocabulary to map.
#[derive(Debug, Clone)]
pub enum ProviderSignal {
    Media(MediaState),
    Playback(PlaybackState),
    Position(u64),
    Duration(u64),
    Spectrum(SpectrumSnapshot),
    Levels { left: f64, right: f64 },
}

/// The at-most-one live provider, owned exclusively by the orchestrator.
/// Destruction is an explicit drop at the end of the teardown
/// continuation.
pub enum ActiveProvider {
    None,
    Audio(AudioProvider),
    Video(VideoProvider),
}

impl ActiveProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ActiveProvider::None => ProviderKind::None,
            ActiveProvider::Audio(_) => ProviderKind::Audio,
            ActiveProvider::Video(_) => ProviderKind::Video,
        }
    }

    pub fn take(&mut self) -> ActiveProvider {
        std::mem::replace(self, ActiveProvider::None)
    }
}
