use std::sync::Arc;

use anyhow::Result;
use piezorem::{
    coordinator::{config::CoordinatorConfig, AxisId, DualAxisCoordinator},
    driver::mock::MockPiezoDriver,
    poll_loop::PollLoop,
    registry::DeviceRegistry,
    settings::{self, SavedSerials},
    socket_server::{config::SocketServerConfig, SocketServer},
};
use tracing::{error, info};

const SETTINGS_PATH: &str = "saved_serial_numbers.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting piezorem with two mock piezo controllers");

    let mut driver = MockPiezoDriver::new();
    driver.add_device("29251927", 75.0);
    driver.add_device("29251900", 75.0);
    let registry = DeviceRegistry::new(Arc::new(driver));

    let serials = match settings::load(SETTINGS_PATH).await {
        Ok(saved) => saved,
        Err(e) => {
            info!("No usable saved serials ({}), writing defaults", e);
            let defaults = SavedSerials {
                serial_x: "29251927".to_string(),
                serial_y: "29251900".to_string(),
            };
            settings::save(SETTINGS_PATH, &defaults).await?;
            defaults
        }
    };

    let coordinator = Arc::new(
        DualAxisCoordinator::new(
            registry,
            CoordinatorConfig::default(),
            &serials.serial_x,
            &serials.serial_y,
            SETTINGS_PATH,
        )
        .await?,
    );
    info!(
        "Axes initialized: X={}, Y={}",
        serials.serial_x, serials.serial_y
    );

    let poll_handle = PollLoop::new(coordinator.clone()).spawn();

    let socket_config = SocketServerConfig::default();
    let socket_path = socket_config.socket_path.clone();
    let mut socket_server = SocketServer::new(socket_config, coordinator.clone());
    socket_server.start().await?;

    info!("Socket server started at {}", socket_path);
    info!("You can connect using socat:");
    info!("  socat - UNIX-CONNECT:{}", socket_path);
    info!(r#"  echo '{{"type": "ping"}}' | socat - UNIX-CONNECT:{}"#, socket_path);
    info!(r#"  echo '{{"type": "get_state", "axis": "x"}}' | socat - UNIX-CONNECT:{}"#, socket_path);

    for axis in AxisId::BOTH {
        match coordinator.read_model(axis).await {
            Ok(model) => info!(
                "Axis {}: serial={} voltage={} max={}",
                axis, model.serial, model.voltage, model.max_voltage
            ),
            Err(e) => error!("Failed to read axis {}: {}", axis, e),
        }
    }

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    poll_handle.abort();
    socket_server.shutdown().await?;
    coordinator.shutdown().await?;
    info!("piezorem shutdown complete");

    Ok(())
}
