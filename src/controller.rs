//! Remote-controller request/notify contract.
//!
//! Only the contract lives here: outbound notifications go through the
//! injected [`ControllerLink`] collaborator, inbound intents are parsed
//! from their wire (type, payload) shape into [`ControlMessage`]s. The
//! transport itself is external.

use log::debug;
use serde_json::Value;

use crate::protocol::{ControlMessage, MetadataUpdate};

pub const MSG_PLAYBACK_SYNC: &str = "gui.player.media.service.sync.status";
pub const MSG_MEDIA_STATUS: &str = "gui.player.media.service.current.media.status";
pub const MSG_GET_NEXT: &str = "gui.player.media.service.get.next";
pub const MSG_GET_PREVIOUS: &str = "gui.player.media.service.get.previous";
pub const MSG_GET_REPEAT: &str = "gui.player.media.service.get.repeat";
pub const MSG_GET_SHUFFLE: &str = "gui.player.media.service.get.shuffle";

const INTENT_PLAY: &str = "gui.player.media.service.play";
const INTENT_PAUSE: &str = "gui.player.media.service.pause";
const INTENT_STOP: &str = "gui.player.media.service.stop";
const INTENT_RESUME: &str = "gui.player.media.service.resume";
const INTENT_SET_META: &str = "gui.player.media.service.set.meta";

/// Fire-and-forget notification sink towards the remote controller.
pub trait ControllerLink: Send {
    fn send_request(&self, message_type: &str, payload: Value);
}

/// Controller link writing JSON lines to stdout, used when no real
/// transport is wired in.
pub struct StdoutController;

impl ControllerLink for StdoutController {
    fn send_request(&self, message_type: &str, payload: Value) {
        println!(
            "{}",
            serde_json::json!({ "type": message_type, "data": payload })
        );
    }
}

/// Parses an inbound controller intent. Unknown types yield `None`.
pub fn parse_intent(message_type: &str, data: &Value) -> Option<ControlMessage> {
    match message_type {
        INTENT_PLAY => Some(ControlMessage::Play {
            track: data
                .get("track")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            repeat: data.get("repeat").and_then(Value::as_bool).unwrap_or(false),
        }),
        INTENT_PAUSE => Some(ControlMessage::Pause),
        INTENT_STOP => Some(ControlMessage::Stop),
        INTENT_RESUME => Some(ControlMessage::Resume),
        INTENT_SET_META => {
            let update: MetadataUpdate =
                serde_json::from_value(data.clone()).unwrap_or_default();
            Some(ControlMessage::SetMeta(update))
        }
        _ => {
            debug!("Ignoring unknown controller intent {}", message_type);
            None
        }
    }
}
