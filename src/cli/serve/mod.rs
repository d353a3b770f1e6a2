//! Development server: compiles pages the first time they are requested.
//!
//! Request flow:
//!
//! ```text
//! shutdown? -> 503
//! liveness channel -> event stream (own thread)
//! reloading? -> wait, then 302 to the same URL
//! ensure_page(path) | route fallback -> 404 / 400
//! soft errors? -> 500
//! artifact
//! ```

mod lifecycle;
mod ping;
mod response;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use tiny_http::{Request, Server};
use tokio::runtime::Handle;

use crate::cli::routes::build_route_index;
use crate::config::HotpageConfig;
use crate::core::{PagePath, decode_request_path, is_shutdown, register_server};
use crate::route::{RouteIndex, RouteParams};
use crate::scheduler::{PageError, Scheduler};
use crate::utils::plural::plural_count;
use crate::log;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct ServeContext {
    scheduler: Scheduler,
    routes: Arc<ArcSwap<RouteIndex>>,
    runtime: Handle,
    ping_interval: Duration,
}

/// Run `hotpage serve` until Ctrl+C.
pub fn serve(config: &HotpageConfig) -> Result<()> {
    // A conflict here is fatal; the watcher only keeps the last good index.
    let index = build_route_index(config)?;
    log!("serve"; "{} in {}", plural_count(index.len(), "route"), config.root_relative(&config.pages.dir).display());
    let routes = Arc::new(ArcSwap::from_pointee(index));

    let (server, addr) = lifecycle::bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);

    let runtime = lifecycle::build_runtime()?;
    let scheduler = lifecycle::spawn_services(&runtime, config, Arc::clone(&routes))?;
    register_server(Arc::clone(&server), scheduler.cancel_token());

    log!("serve"; "http://{}", addr);

    let ctx = ServeContext {
        scheduler: scheduler.clone(),
        routes,
        runtime: runtime.handle().clone(),
        ping_interval: config.on_demand.ping_interval(),
    };
    run_request_loop(&server, &ctx)?;

    lifecycle::shutdown(runtime, &scheduler);
    Ok(())
}

fn run_request_loop(server: &Server, ctx: &ServeContext) -> Result<()> {
    // Pages wait on compile passes; a pool keeps one slow page from blocking the rest
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .thread_name(|i| format!("hotpage-http-{i}"))
        .build()
        .context("Failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let ctx = ctx.clone();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &ctx) {
                log!("serve"; "request error: {e:#}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request(request: Request, ctx: &ServeContext) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }

    let url = request.url().to_string();

    if ping::is_liveness_request(&url) {
        let Some(page) = ping::page_param(&url) else {
            return response::respond_bad_request(request, "missing `page` parameter");
        };
        let ctx = ctx.clone();
        thread::spawn(move || {
            if let Err(e) = ping::stream(request, page, ctx) {
                log!("ping"; "stream error: {e:#}");
            }
        });
        return Ok(());
    }

    if ctx.scheduler.is_reloading() {
        ctx.runtime.block_on(ctx.scheduler.wait_until_reloaded());
        return response::respond_redirect(request, &url);
    }

    let (page, params) = match resolve_page(ctx, &url) {
        Ok(Some(found)) => found,
        Ok(None) => return response::respond_not_found(request),
        Err(Rejected::BadRequest(reason)) => {
            return response::respond_bad_request(request, &reason);
        }
        Err(Rejected::Stopped) => return response::respond_unavailable(request),
    };

    let errors = ctx.scheduler.compilation_errors(&page);
    if !errors.is_empty() {
        return response::respond_compile_errors(request, &errors);
    }

    match ctx.scheduler.artifact(&page) {
        Some(path) => response::respond_file(request, &path, params.as_ref()),
        None => response::respond_not_found(request),
    }
}

enum Rejected {
    BadRequest(String),
    Stopped,
}

/// Build the page a URL names, directly or through the first matching route.
fn resolve_page(
    ctx: &ServeContext,
    url: &str,
) -> Result<Option<(PagePath, Option<RouteParams>)>, Rejected> {
    let ensure = |page: &str| ctx.runtime.block_on(ctx.scheduler.ensure_page(page));

    match ensure(&decode_request_path(url)) {
        Ok(page) => return Ok(Some((page, None))),
        Err(PageError::Stopped(_)) => return Err(Rejected::Stopped),
        Err(PageError::NotFound(_)) => {}
    }

    let routes = ctx.routes.load();
    let resolved = match routes.resolve(url) {
        Ok(Some(resolved)) => resolved,
        Ok(None) => return Ok(None),
        Err(e) => return Err(Rejected::BadRequest(e.to_string())),
    };

    match ensure(resolved.page.as_str()) {
        Ok(page) => Ok(Some((page, Some(resolved.params)))),
        Err(PageError::NotFound(_)) => Ok(None),
        Err(PageError::Stopped(_)) => Err(Rejected::Stopped),
    }
}
