//! Server lifecycle: binding, runtime and background tasks.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use arc_swap::ArcSwap;
use tiny_http::Server;
use tokio::runtime::Runtime;

use crate::compiler::{self, CompilerActor, backend_factory};
use crate::config::HotpageConfig;
use crate::route::RouteIndex;
use crate::scheduler::{Scheduler, SchedulerOptions};
use crate::watch::FsActor;
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

pub fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("hotpage-rt")
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Start the scheduler, compiler actor, disposal timer and (optionally)
/// the file watcher on `runtime`.
pub fn spawn_services(
    runtime: &Runtime,
    config: &HotpageConfig,
    routes: Arc<ArcSwap<RouteIndex>>,
) -> Result<Scheduler> {
    let _guard = runtime.enter();

    let (driver, rx) = compiler::channel();
    let scheduler = Scheduler::new(SchedulerOptions::from_config(config), driver);

    let factory = backend_factory(
        config.compiler.command.clone(),
        config.root.clone(),
        config.compiler.existing_deps(),
    );
    let actor = CompilerActor::new(rx, scheduler.clone(), factory)?;
    runtime.spawn(actor.run());
    scheduler.spawn_disposal();

    if config.serve.watch {
        let mut watched = vec![config.pages.dir.clone()];
        watched.extend(config.compiler.existing_deps());
        let watcher = FsActor::new(watched, scheduler.clone(), routes)?;
        runtime.spawn(watcher.run());
        debug!("watch"; "watching {}", config.root_relative(&config.pages.dir).display());
    }

    Ok(scheduler)
}

/// Release waiters, stop background tasks and give them a moment to finish.
pub fn shutdown(runtime: Runtime, scheduler: &Scheduler) {
    scheduler.stop();
    runtime.shutdown_timeout(Duration::from_secs(2));
}
