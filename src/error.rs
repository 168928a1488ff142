//! Error taxonomy for the playback core.
//!
//! Nothing in this subsystem is allowed to terminate the process; every
//! failure degrades to a NoMedia/Stopped baseline, so these errors surface
//! through logs and media-state transitions rather than propagating far.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("no playable track in source")]
    NoTrack,

    #[error("audio sink error: {0}")]
    Sink(String),

    #[error("source fetch error: {0}")]
    Fetch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
