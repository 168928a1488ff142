mod config;
mod controller;
mod decoder;
mod error;
mod orchestrator;
mod pipeline;
mod protocol;
mod protocol_utils;
mod providers;
mod reachability;
mod sink;
mod spectrum;
#[cfg(test)]
mod test_support;

use std::io::BufRead;
use std::path::Path;
use std::thread;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::broadcast;

use config::Config;
use controller::StdoutController;
use decoder::SymphoniaDecoder;
use orchestrator::{bus_scheduler, MediaOrchestrator, OrchestratorContext};
use protocol::{MediaCommand, Message, ProviderKind};
use providers::video_provider::NullVideoBackend;
use reachability::is_playable_url;
use sink::CpalSink;

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

/// Maps one wire line onto a bus message. Controller intents take
/// precedence; everything else is a direct media command.
fn parse_wire_line(line: &str) -> Option<Message> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring malformed input line: {}", e);
            return None;
        }
    };
    let message_type = value.get("type").and_then(Value::as_str)?;
    let data = value.get("data").cloned().unwrap_or(Value::Null);

    if let Some(control) = controller::parse_intent(message_type, &data) {
        return Some(Message::Control(control));
    }

    let command = match message_type {
        "load" => MediaCommand::Load {
            url: data
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            kind: match data.get("kind").and_then(Value::as_str) {
                Some("video") => ProviderKind::Video,
                Some("audio") | None => ProviderKind::Audio,
                Some(other) => {
                    warn!("Unknown provider kind '{}'", other);
                    return None;
                }
            },
        },
        "stop" => MediaCommand::Stop,
        "pause" => MediaCommand::Pause,
        "resume" => MediaCommand::Resume,
        "restart" => MediaCommand::Restart,
        "seek" => MediaCommand::Seek(data.get("position").and_then(Value::as_u64).unwrap_or(0)),
        "sync" => MediaCommand::SyncStates,
        "service-info" => MediaCommand::RequestServiceInfo(
            data.get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        "play-metadata" => MediaCommand::RequestPlayMetadata,
        "service-metadata" => MediaCommand::RequestServiceMetadata,
        "next" => MediaCommand::Next,
        "previous" => MediaCommand::Previous,
        "repeat" => MediaCommand::Repeat,
        "shuffle" => MediaCommand::Shuffle,
        other => {
            debug!("Ignoring unknown message type '{}'", other);
            return None;
        }
    };
    Some(Message::Command(command))
}

fn main() {
    let level = std::env::var("MEDLEY_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(log::LevelFilter::Debug);
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = Config::load(Path::new("medley.toml"));
    info!("Starting media service with {:?}", config);

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let orchestrator_receiver = bus_sender.subscribe();
    let orchestrator_sender = bus_sender.clone();
    let scheduler = bus_scheduler(bus_sender.clone());
    thread::spawn(move || {
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut orchestrator = MediaOrchestrator::new(OrchestratorContext {
                bus_receiver: orchestrator_receiver,
                bus_sender: orchestrator_sender,
                controller: Box::new(StdoutController),
                url_validator: Box::new(is_playable_url),
                sink_factory: Box::new(|| Box::new(CpalSink::new())),
                decoder_factory: Box::new(|| Box::new(SymphoniaDecoder::new())),
                video_backend_factory: Box::new(|| Box::new(NullVideoBackend)),
                scheduler,
                config,
            });
            orchestrator.run();
        }));
        if let Err(payload) = run_result {
            log::error!(
                "Orchestrator thread terminated due to panic: {}",
                panic_payload_to_string(payload.as_ref())
            );
        }
    });

    // Drive the service from JSON lines on stdin until EOF.
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(message) = parse_wire_line(&line) {
            let _ = bus_sender.send(message);
        }
    }

    info!("Media service exiting");
}
