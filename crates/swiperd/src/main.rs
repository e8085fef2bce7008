//! swiperd — runs a local rendezvous discovery simulation.
//!
//! Every simulated node announces itself on the configured resource and
//! watches it, all over one in-process loopback network. Discovered peers
//! are logged; set RUST_LOG=debug to follow channel rotation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use swiper_core::config::SwiperConfig;
use swiper_core::{PeerId, SystemClock};
use swiper_services::{ChannelRegistry, DiscoveryTask, MemoryNetwork, Swiper, Watch};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = SwiperConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = SwiperConfig::load().context("failed to load config")?;
    let sim = &config.simulation;

    tracing::info!(
        nodes = sim.nodes,
        interval_secs = config.discovery.interval_secs,
        "swiperd starting"
    );

    let shutdown = CancellationToken::new();
    let network = MemoryNetwork::new();
    let mut tasks: Vec<DiscoveryTask> = Vec::new();

    for i in 0..sim.nodes {
        let id = PeerId::from_label(&format!("node-{i}"));
        let transport = Arc::new(network.node(id));
        let swiper = Swiper::scoped(
            Arc::new(ChannelRegistry::new(transport)),
            Arc::new(SystemClock),
            &config.discovery,
            &shutdown,
        )
        .context("invalid discovery config")?;

        tasks.push(swiper.announce(sim.resource.as_bytes(), sim.seed.as_bytes(), &shutdown));

        let Watch { mut peers, task } =
            swiper.watch(sim.resource.as_bytes(), sim.seed.as_bytes(), &shutdown);
        tokio::spawn(async move {
            while let Some(peer) = peers.recv().await {
                tracing::info!(node = %id, peer = %peer.id, "peer discovered");
            }
        });
        tasks.push(task);
    }

    let run = async {
        if sim.run_secs == 0 {
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")
        } else {
            tokio::time::sleep(Duration::from_secs(sim.run_secs)).await;
            Ok(())
        }
    };
    run.await?;

    tracing::info!("shutting down");
    shutdown.cancel();
    for task in tasks {
        task.wait().await;
    }
    tracing::info!(
        active_channels = network.active_channels().len(),
        "swiperd stopped"
    );
    Ok(())
}
