//! # UAV Guidance Simulator
//!
//! Runs the guidance worker against a kinematic vehicle over a seeded ground
//! scene, then prints what was located next to the ground truth.

mod config;
mod scene;
mod transport;

use crate::config::{load_guidance_config, SimConfig};
use crate::scene::{SceneDetector, SceneTracker, SimScene};
use crate::transport::SimTransport;

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use uav_core::{Pose, WorkMode};
use uav_guidance::{DroneGuidanceController, GuidanceHandle, GuidanceWorker};
use uav_vision::VisionPipeline;

/// Scene radius around the start point, meters
const SCENE_RADIUS: f64 = 40.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("🚁 Starting UAV guidance simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let sim = SimConfig::from_env();
    let guidance = load_guidance_config()?;
    info!("Configuration loaded");
    info!("   Mode: {}", sim.mode);
    info!("   Vehicles: {} (seed {})", sim.vehicles, sim.seed);
    info!("   Altitude: {} m", sim.altitude);
    info!("   Camera: {} @ {}°", guidance.camera.resolution, guidance.camera.fov_degrees);

    if let Some(port) = sim.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!("📊 Metrics available at http://{}/metrics", addr),
            Err(e) => warn!("Metrics exporter disabled: {}", e),
        }
    }

    let transport = SimTransport::new(
        Pose::at(0.0, 0.0, -sim.altitude),
        guidance.camera.resolution,
        sim.frame_interval,
    );
    let scene = Arc::new(SimScene::random(
        sim.vehicles,
        SCENE_RADIUS,
        sim.seed,
        transport.state(),
        guidance.camera.intrinsics(),
    ));
    for vehicle in scene.vehicles() {
        info!(
            "   Vehicle {} class {} at ({:.1}, {:.1})",
            vehicle.id, vehicle.class_id, vehicle.position.x, vehicle.position.y
        );
    }

    let vision = VisionPipeline::new(guidance.vision.clone(), Box::new(SceneDetector(scene.clone())))
        .with_tracker(Box::new(SceneTracker(scene.clone())));
    let controller = DroneGuidanceController::new(guidance, Arc::new(transport), vision)?;
    let (worker, handle) = GuidanceWorker::new(controller);
    let worker_thread = worker.spawn()?;

    tokio::spawn(log_events(handle.clone()));

    handle.set_work_mode(sim.mode).await?;
    if sim.mode == WorkMode::MultiTrack {
        handle.set_target_ids(sim.target_queue()).await?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🚀 Guidance running for {:?}", sim.duration);

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = tokio::time::sleep(sim.duration) => {
            info!("Simulation time elapsed");
        }
    }

    handle.stop();
    if tokio::task::spawn_blocking(move || worker_thread.join()).await?.is_err() {
        error!("Guidance worker panicked");
    }

    let stats = handle.stats();
    info!(
        "Frames processed: {}, failed: {}",
        stats.frames_processed, stats.frames_failed
    );
    report(&handle, &scene);
    println!("{}", handle.history().export_json()?);

    info!("🛑 Simulator shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,uav_guidance=debug,uav_sim=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}

/// Forward guidance events to the log until the worker goes away
async fn log_events(handle: GuidanceHandle) {
    let mut events = handle.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => info!("📡 {}: {:?}", event.kind(), event.payload),
            Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Compare located positions with the nearest scene vehicle
fn report(handle: &GuidanceHandle, scene: &SimScene) {
    let targets = handle.targets();
    let tracked = handle.tracked_targets();
    info!("Located {} targets, {} tracked targets", targets.len(), tracked.len());

    let located = targets
        .iter()
        .map(|t| (None, t))
        .chain(tracked.iter().map(|t| (Some(t.track_id), &t.target)));
    for (track_id, target) in located {
        let label = track_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
        match scene.nearest_vehicle(&target.location) {
            Some((vehicle, error)) => info!(
                "   {} {} at ({:.1}, {:.1}): nearest vehicle {} ({:.2} m off)",
                label, target.class_name, target.location.x, target.location.y, vehicle.id, error
            ),
            None => info!("   {} {} with no vehicle in the scene", label, target.class_name),
        }
    }
}
