//! Request handling for the IPC server.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use soundwarden_core::AudioEngine;
use soundwarden_ipc::messages::{ErrorInfo, Method};

fn to_json<T: Serialize>(value: &T) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|e| ErrorInfo::from(&soundwarden_core::Error::from(e)))
}

/// Handle an IPC request and return a response value.
///
/// Commands call into the engine and may block on backend round trips, so
/// this runs on a blocking worker.
pub fn handle_request(engine: &AudioEngine, method: &Method) -> Result<Value, ErrorInfo> {
    if let Some(command) = method.command() {
        info!(?command, "Executing command");
        return match engine.execute(command) {
            Ok(()) => Ok(json!({ "success": true })),
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Command failed");
                Err(ErrorInfo::from(&e))
            }
        };
    }

    match method {
        Method::GetState => to_json(&*engine.properties()),

        Method::GetCards { available_only } => {
            let props = engine.properties();
            if *available_only { to_json(&props.cards_without_unavailable) } else { to_json(&props.cards) }
        }

        Method::GetObject { path } => {
            let props = engine.properties();
            let object = props
                .objects
                .get(path)
                .ok_or_else(|| ErrorInfo::new(404, format!("Object not found: {path}")))?;
            to_json(object)
        }

        Method::IsPortEnabled { card, port } => engine
            .is_port_enabled(*card, port)
            .map(|enabled| json!({ "enabled": enabled }))
            .map_err(|e| ErrorInfo::from(&e)),

        Method::GetBluetoothAudioMode => {
            let props = engine.properties();
            Ok(json!({
                "mode": props.bluetooth_audio_mode,
                "opts": props.bluetooth_audio_mode_opts,
            }))
        }

        Method::GetDiagnostics => to_json(&engine.diagnostics()),

        Method::Subscribe { events } | Method::Unsubscribe { events } => {
            // Answered by the socket layer; nothing to do here
            debug!(?events, "Subscription request reached the daemon");
            Ok(Value::Null)
        }

        Method::Shutdown => Ok(json!({ "success": true })),

        other => {
            warn!(method = ?other, "Unhandled method");
            Err(ErrorInfo::invalid_request("Unsupported method"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use soundwarden_core::{
        Backend, CardInfo, ChannelVolume, Direction, EndpointInfo, EngineConfig, MemoryStore, ServerInfo,
        SinkInputInfo,
    };

    use super::*;

    /// A server with nothing plugged in.
    struct EmptyBackend;

    impl Backend for EmptyBackend {
        fn server_info(&self) -> soundwarden_core::Result<ServerInfo> {
            Ok(ServerInfo {
                server_name: "PulseAudio (on PipeWire 1.2.7)".into(),
                default_sink_name: String::new(),
                default_source_name: String::new(),
            })
        }

        fn cards(&self) -> soundwarden_core::Result<Vec<CardInfo>> {
            Ok(Vec::new())
        }

        fn sinks(&self) -> soundwarden_core::Result<Vec<EndpointInfo>> {
            Ok(Vec::new())
        }

        fn sources(&self) -> soundwarden_core::Result<Vec<EndpointInfo>> {
            Ok(Vec::new())
        }

        fn sink_inputs(&self) -> soundwarden_core::Result<Vec<SinkInputInfo>> {
            Ok(Vec::new())
        }

        fn set_card_profile(&self, _card: u32, _profile: &str) -> soundwarden_core::Result<()> {
            Ok(())
        }

        fn set_port(&self, _direction: Direction, _index: u32, _port: &str) -> soundwarden_core::Result<()> {
            Ok(())
        }

        fn set_default(&self, _direction: Direction, _name: &str) -> soundwarden_core::Result<()> {
            Ok(())
        }

        fn set_volume(&self, _direction: Direction, _index: u32, _volume: &ChannelVolume) -> soundwarden_core::Result<()> {
            Ok(())
        }

        fn set_mute(&self, _direction: Direction, _index: u32, _muted: bool) -> soundwarden_core::Result<()> {
            Ok(())
        }

        fn move_sink_inputs(&self, _inputs: &[u32], _sink: u32) -> soundwarden_core::Result<()> {
            Ok(())
        }
    }

    fn engine() -> AudioEngine {
        AudioEngine::new(Arc::new(EmptyBackend), Arc::new(MemoryStore::new()), EngineConfig::default())
    }

    #[test]
    fn test_commands_need_a_backend() {
        let engine = engine();
        let result = handle_request(&engine, &Method::SetMute { direction: Direction::Sink, muted: true });
        assert_eq!(result.map_err(|e| e.code), Err(503));
    }

    #[test]
    fn test_queries() {
        let engine = engine();
        engine.initialize();

        let state = handle_request(&engine, &Method::GetState).expect("GetState failed");
        assert_eq!(state["default_sink"], json!("/"));

        let diagnostics = handle_request(&engine, &Method::GetDiagnostics).expect("GetDiagnostics failed");
        assert_eq!(diagnostics["epoch"], json!(1));

        let cards = handle_request(&engine, &Method::GetCards { available_only: true }).expect("GetCards failed");
        assert_eq!(cards, json!([]));

        let missing = handle_request(&engine, &Method::IsPortEnabled { card: 9, port: "analog-output".into() });
        assert_eq!(missing.map_err(|e| e.code), Err(404));

        let object = handle_request(&engine, &Method::GetObject { path: "/org/soundwarden/Audio/Sink1".into() });
        assert_eq!(object.map_err(|e| e.code), Err(404));
    }
}
