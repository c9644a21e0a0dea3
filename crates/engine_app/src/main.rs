//! # engine_app
//!
//! Host process for the component runtime.
//!
//! ## Startup Sequence
//!
//! 1. Install logging and parse the command line.
//! 2. Register version 1 of the demo module.
//! 3. Optionally connect to NATS for sphere-event forwarding.
//! 4. Start the scenes and populate them.
//! 5. Run the tick loop, hot-swapping the module on schedule.
//! 6. Shut the scenes down and dispose the registry.

mod demo;
mod tick;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine_assembly::ManifestRegistry;
use engine_component::TypeName;
use engine_net::messages::SubscribeSphereEventRequest;
use engine_net::{NatsConnection, NatsSphereSink, RemoteEventSink, RouteId};
use engine_system::{SceneConfig, SceneRunner, handle_subscribe};
use tick::{TickConfig, TickLoop};

/// Command line of the host.
#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Runs scenes and hot-swaps a demo module")]
struct Args {
    /// Number of scenes to run.
    #[arg(long, default_value_t = 2)]
    scenes: usize,
    /// Target ticks per second.
    #[arg(long, default_value_t = 30.0)]
    tick_rate: f64,
    /// Stop after this many ticks (0 = run until interrupted).
    #[arg(long, default_value_t = 300)]
    max_ticks: u64,
    /// Swap module versions every this many ticks (0 = never).
    #[arg(long, default_value_t = 60)]
    reload_every: u64,
    /// Ships spawned in each scene.
    #[arg(long, default_value_t = 8)]
    entities: usize,
    /// NATS server for sphere events. Falls back to `NATS_URL`.
    #[arg(long)]
    nats_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(?args, "engine host starting");

    let registry = ManifestRegistry::new();
    let version = demo::Version::V1;
    registry.register(demo::manifest(version)).await;

    let sink: Option<Arc<dyn RemoteEventSink>> =
        match NatsConnection::resolve_url(args.nats_url.as_deref()) {
            Some(url) => {
                let conn = NatsConnection::connect_to(&url).await?;
                Some(Arc::new(NatsSphereSink::new(
                    conn,
                    tokio::runtime::Handle::current(),
                )))
            }
            None => {
                info!("no NATS URL; sphere events stay local");
                None
            }
        };

    let mut scenes = Vec::with_capacity(args.scenes);
    for index in 0..args.scenes {
        let scene_id = index as u64 + 1;
        let config = SceneConfig::new(format!("scene-{scene_id}")).with_scene_id(scene_id);
        let mut runner = SceneRunner::new(config);
        if let Some(sink) = &sink {
            runner = runner.with_remote_sink(Arc::clone(sink));
        }
        let scene = runner.start(&registry).await;

        for _ in 0..args.entities {
            scene.spawn(demo::Ship::default()).await?;
        }
        let request = SubscribeSphereEventRequest {
            route_id: RouteId(scene_id),
            type_hash: demo::Flare::type_identity(),
        };
        let response = handle_subscribe(&scene, request).await;
        info!(
            scene = %scene.name(),
            entities = args.entities,
            subscribed = response.is_success(),
            "scene populated"
        );
        scenes.push(scene);
    }

    let config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.max_ticks,
        reload_every: args.reload_every,
    };
    let mut tick_loop = TickLoop::new(config, registry.clone(), scenes, version);
    tokio::select! {
        result = tick_loop.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    info!(
        ticks = tick_loop.tick_id(),
        version = %tick_loop.version(),
        "tick loop stopped"
    );

    tick_loop.shutdown().await;
    registry.dispose().await;
    info!("engine host shut down");
    Ok(())
}
