//! Assembling a station from its configuration
//!
//! Stream mode opens its frame source before the first connection attempt,
//! so a missing camera ends the process without touching the network.

use super::{CommandRelay, FramePublisher, StationRunner, SteadyState};
use crate::capture::{prepare_frame_source, FrameSource};
use crate::clock::Clock;
use crate::config::StationConfig;
use crate::error::StationResult;
use crate::transport::Connector;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Open `source`, then publish its frames until shutdown or a fatal error
pub async fn run_stream_station<C: Connector>(
    config: &StationConfig,
    source: Box<dyn FrameSource>,
    connector: C,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> StationResult<()> {
    let source = prepare_frame_source(source, &config.stream).await?;
    let publisher = FramePublisher::new(
        config.station.id.clone(),
        source,
        Arc::clone(&clock),
        &config.stream,
    );
    run_link(config, connector, publisher, clock, shutdown).await
}

/// Relay remote commands until shutdown or a fatal error
pub async fn run_relay_station<C: Connector>(
    config: &StationConfig,
    connector: C,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> StationResult<()> {
    let relay = CommandRelay::new(config.station.id.clone());
    run_link(config, connector, relay, clock, shutdown).await
}

async fn run_link<C: Connector, M: SteadyState>(
    config: &StationConfig,
    connector: C,
    steady: M,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> StationResult<()> {
    let mode = steady.mode();
    let settings = config.link_settings(mode);
    info!(
        station_id = %settings.station_id,
        mode = %mode,
        "Station starting"
    );
    for (index, endpoint) in settings.endpoints.iter().enumerate() {
        info!(candidate = index, endpoint = %endpoint, "Endpoint candidate");
    }

    let mut runner = StationRunner::new(settings, connector, steady, clock, shutdown)?;
    runner.run().await
}
