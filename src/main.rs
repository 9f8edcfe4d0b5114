use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use roombook::auth::AccessPolicy;
use roombook::catalog::Catalog;
use roombook::clock::SystemClock;
use roombook::config::Config;
use roombook::engine::Engine;
use roombook::limits::DRAIN_TIMEOUT_SECS;
use roombook::observability::{self, CONNECTIONS_ACTIVE, CONNECTIONS_REJECTED_TOTAL, CONNECTIONS_TOTAL};
use roombook::{seed, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    let engine = Arc::new(Engine::new(
        Arc::new(Catalog::default()),
        AccessPolicy::new(config.privileged_user.clone()),
        Arc::new(SystemClock),
    ));
    if config.seed_demo {
        seed::seed_demo(&engine);
    }

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        resources = engine.catalog().len(),
        max_connections = config.max_connections,
        privileged_user = %config.privileged_user,
        "roombook listening on {addr}"
    );

    let slots = Arc::new(Semaphore::new(config.max_connections));
    serve(&listener, &engine, &slots).await;
    drain(&slots, config.max_connections).await;

    info!("roombook stopped");
    Ok(())
}

/// Accept until ctrl-c or SIGTERM. Each connection holds one semaphore slot.
async fn serve(listener: &TcpListener, engine: &Arc<Engine>, slots: &Arc<Semaphore>) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = &mut shutdown => {
                info!("shutdown requested, no longer accepting");
                return;
            }
        };
        let (socket, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };

        let Ok(slot) = slots.clone().try_acquire_owned() else {
            warn!("at connection limit, refusing {peer}");
            metrics::counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
            continue;
        };

        info!("client connected: {peer}");
        metrics::counter!(CONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);

        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = wire::process_connection(socket, engine).await {
                error!("client {peer}: {e}");
            }
            metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
            drop(slot);
        });
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("cannot listen for SIGTERM: {e}"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

/// Wait for open connections to hand back their slots, up to the drain timeout.
async fn drain(slots: &Semaphore, max_connections: usize) {
    let open = max_connections - slots.available_permits();
    if open == 0 {
        return;
    }
    info!("waiting for {open} open connections");

    let total = u32::try_from(max_connections).unwrap_or(u32::MAX);
    let timeout = Duration::from_secs(DRAIN_TIMEOUT_SECS);
    match tokio::time::timeout(timeout, slots.acquire_many(total)).await {
        Ok(_) => info!("all connections closed"),
        Err(_) => {
            let still_open = max_connections - slots.available_permits();
            warn!("gave up after {DRAIN_TIMEOUT_SECS}s with {still_open} connections open");
        }
    }
}
