pub mod config;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    coordinator::DualAxisCoordinator,
    protocol::{
        client_command::ClientCommand, parse_command, serialize_response,
        server_response::ServerResponse,
    },
};
use config::SocketServerConfig;

pub struct SocketServer {
    config: SocketServerConfig,
    coordinator: Arc<DualAxisCoordinator>,
    shutdown_tx: Option<tokio::sync::broadcast::Sender<()>>,
}

impl SocketServer {
    pub fn new(config: SocketServerConfig, coordinator: Arc<DualAxisCoordinator>) -> Self {
        Self {
            config,
            coordinator,
            shutdown_tx: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if Path::new(&self.config.socket_path).exists() {
            tokio::fs::remove_file(&self.config.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!("Socket server listening on: {}", self.config.socket_path);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let coordinator = self.coordinator.clone();
        let max_connections = self.config.max_connections;

        tokio::spawn(async move {
            let active_connections = Arc::new(AtomicUsize::new(0));

            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, _addr)) => {
                                let current_connections = active_connections.load(Ordering::Relaxed);
                                if current_connections >= max_connections {
                                    warn!("Maximum connections reached ({}), rejecting new connection", current_connections);
                                    continue;
                                }

                                active_connections.fetch_add(1, Ordering::Relaxed);
                                let conn_id = Uuid::new_v4();
                                debug!("Client {} connected. Active connections: {}", conn_id, active_connections.load(Ordering::Relaxed));

                                let coordinator_clone = coordinator.clone();
                                let mut shutdown_rx_clone = shutdown_rx.resubscribe();
                                let active_connections_clone = active_connections.clone();

                                tokio::spawn(async move {
                                    let result = Self::handle_client(stream, coordinator_clone, &mut shutdown_rx_clone).await;
                                    if let Err(e) = result {
                                        error!("Client {} handler error: {}", conn_id, e);
                                    }

                                    let remaining = active_connections_clone.fetch_sub(1, Ordering::Relaxed) - 1;
                                    debug!("Client {} disconnected. Active connections: {}", conn_id, remaining);
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Socket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        if Path::new(&self.config.socket_path).exists() {
            tokio::fs::remove_file(&self.config.socket_path).await?;
        }

        info!("Socket server shutdown complete");
        Ok(())
    }

    async fn handle_client(
        stream: UnixStream,
        coordinator: Arc<DualAxisCoordinator>,
        shutdown_rx: &mut tokio::sync::broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut framed = Framed::new(stream, LinesCodec::new());

        loop {
            tokio::select! {
                line_result = framed.next() => {
                    match line_result {
                        Some(Ok(line)) => {
                            debug!("Received command: {}", line);

                            let response = Self::process_command(&line, &coordinator).await;
                            let response_json = serialize_response(&response)?;

                            if let Err(e) = framed.send(response_json).await {
                                error!("Failed to send response: {}", e);
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error reading from client: {}", e);
                            break;
                        }
                        None => {
                            debug!("Client disconnected");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Shutdown signal received, closing client connection");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn process_command(line: &str, coordinator: &DualAxisCoordinator) -> ServerResponse {
        let command = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                return ServerResponse::error(None, format!("Failed to parse command: {}", e));
            }
        };

        let command_id = command.id().cloned();

        match Self::execute_command(command, coordinator).await {
            Ok(data) => ServerResponse::success(command_id, data),
            Err(e) => match e.downcast_ref::<crate::error::ControlError>() {
                Some(control_err) => ServerResponse::control_error(command_id, control_err),
                None => ServerResponse::error(command_id, e.to_string()),
            },
        }
    }

    async fn execute_command(
        command: ClientCommand,
        coordinator: &DualAxisCoordinator,
    ) -> Result<serde_json::Value> {
        match command {
            ClientCommand::Increase { axis, .. } => {
                coordinator.increase(axis).await?;
                Ok(json!({"status": "ok", "action": "increase", "axis": axis}))
            }
            ClientCommand::Decrease { axis, .. } => {
                coordinator.decrease(axis).await?;
                Ok(json!({"status": "ok", "action": "decrease", "axis": axis}))
            }
            ClientCommand::SetVoltage { axis, value, .. } => {
                coordinator.set_voltage(axis, value).await?;
                Ok(json!({"status": "ok", "action": "set_voltage", "axis": axis, "value": value}))
            }
            ClientCommand::SetJogStep { axis, value, .. } => {
                coordinator.set_jog_step(axis, value).await?;
                Ok(json!({"status": "ok", "action": "set_jog_step", "axis": axis, "value": value}))
            }
            ClientCommand::Zero { axis, .. } => {
                coordinator.zero(axis).await?;
                Ok(json!({"status": "ok", "action": "zero", "axis": axis}))
            }
            ClientCommand::Connect { axis, .. } => {
                coordinator.connect(axis).await?;
                Ok(json!({"status": "ok", "action": "connect", "axis": axis}))
            }
            ClientCommand::Disconnect { axis, .. } => {
                coordinator.disconnect(axis).await?;
                Ok(json!({"status": "ok", "action": "disconnect", "axis": axis}))
            }
            ClientCommand::Enable { axis, .. } => {
                coordinator.enable(axis).await?;
                Ok(json!({"status": "ok", "action": "enable", "axis": axis}))
            }
            ClientCommand::Disable { axis, .. } => {
                coordinator.disable(axis).await?;
                Ok(json!({"status": "ok", "action": "disable", "axis": axis}))
            }
            ClientCommand::ToggleDirection { axis, .. } => {
                let unflipped = coordinator.toggle_direction(axis).await;
                Ok(json!({"status": "ok", "action": "toggle_direction", "axis": axis, "direction_unflipped": unflipped}))
            }
            ClientCommand::GetState { axis, .. } => {
                let model = coordinator.read_model(axis).await?;
                Ok(json!({"axis": axis, "state": model}))
            }
            ClientCommand::ReassignSerials {
                serial_x, serial_y, ..
            } => {
                coordinator.reassign_serials(&serial_x, &serial_y).await?;
                Ok(json!({"status": "ok", "action": "reassign_serials", "serial_x": serial_x, "serial_y": serial_y}))
            }
            ClientCommand::Ping { .. } => Ok(json!({
                "message": "pong",
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::config::CoordinatorConfig;
    use crate::coordinator::AxisId;
    use crate::driver::mock::MockPiezoDriver;
    use crate::registry::DeviceRegistry;
    use std::time::Duration;

    async fn test_coordinator() -> (Arc<DualAxisCoordinator>, tempfile::TempDir) {
        let mut driver = MockPiezoDriver::new();
        driver.add_device("29251927", 75.0);
        driver.add_device("29251900", 75.0);
        let registry = DeviceRegistry::new(Arc::new(driver));
        let dir = tempfile::tempdir().unwrap();
        let coordinator = DualAxisCoordinator::new(
            registry,
            CoordinatorConfig::default(),
            "29251927",
            "29251900",
            dir.path().join("saved_serial_numbers.json"),
        )
        .await
        .unwrap();
        tokio::time::advance(Duration::from_millis(251)).await;
        (Arc::new(coordinator), dir)
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_set_voltage_and_get_state() {
        let (coordinator, _dir) = test_coordinator().await;

        let response = SocketServer::process_command(
            r#"{"type": "set_voltage", "axis": "x", "value": 40.0, "id": "a"}"#,
            &coordinator,
        )
        .await;
        assert!(matches!(response, ServerResponse::Success { .. }));

        let response = SocketServer::process_command(
            r#"{"type": "get_state", "axis": "x"}"#,
            &coordinator,
        )
        .await;
        match response {
            ServerResponse::Success { data, .. } => {
                assert_eq!(data["state"]["voltage"], 40.0);
                assert_eq!(data["state"]["connected"], true);
            }
            other => panic!("Expected success, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_maps_to_coded_error() {
        let (coordinator, _dir) = test_coordinator().await;

        coordinator.set_voltage(AxisId::X, 40.0).await.unwrap();
        // Still settling: the next voltage command must surface as a typed
        // rejection, not silently drop.
        let response = SocketServer::process_command(
            r#"{"type": "set_voltage", "axis": "x", "value": 10.0}"#,
            &coordinator,
        )
        .await;
        match response {
            ServerResponse::Error { code, .. } => assert_eq!(code.as_deref(), Some("rejected")),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_line_reports_parse_error() {
        let (coordinator, _dir) = test_coordinator().await;

        let response = SocketServer::process_command("not json", &coordinator).await;
        assert!(matches!(response, ServerResponse::Error { .. }));
    }
}
