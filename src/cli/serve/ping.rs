//! Liveness channel: a server-sent event stream per open page.
//!
//! The client keeps `GET /_hotpage/on-demand?page=/blog/post` open. Every
//! tick the scheduler is pinged for that page and the answer is sent as one
//! `data:` event. `{"invalid":true}` tells the client to reload.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use tiny_http::Request;

use super::ServeContext;
use crate::core::is_shutdown;
use crate::debug;
use crate::scheduler::PingResponse;
use crate::utils::mime::types::EVENT_STREAM;

pub const LIVENESS_PATH: &str = "/_hotpage/on-demand";

pub fn is_liveness_request(url: &str) -> bool {
    url.split(['?', '#']).next() == Some(LIVENESS_PATH)
}

/// The `page` query parameter of a liveness request.
pub fn page_param(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned())
}

fn event(response: PingResponse) -> String {
    format!("data: {}\n\n", response.to_json())
}

fn send_event(writer: &mut impl Write, response: PingResponse) -> std::io::Result<()> {
    writer.write_all(event(response).as_bytes())?;
    writer.flush()
}

/// Hold the connection and emit one event per tick until the client leaves
/// or the server shuts down. Blocks; run it on a dedicated thread.
pub fn stream(request: Request, page: String, ctx: ServeContext) -> Result<()> {
    let mut writer = request.into_writer();
    write!(writer, "HTTP/1.1 200 OK\r\n")?;
    write!(writer, "Content-Type: {EVENT_STREAM}\r\n")?;
    write!(writer, "Cache-Control: no-cache\r\n")?;
    write!(writer, "Connection: keep-alive\r\n\r\n")?;
    writer.flush()?;

    debug!("ping"; "client connected for {}", page);
    let cancel = ctx.scheduler.cancel_token();

    while !is_shutdown() && !cancel.is_cancelled() {
        if ctx.scheduler.is_reloading() {
            ctx.runtime.block_on(ctx.scheduler.wait_until_reloaded());
        }

        if let Some(response) = ctx.scheduler.handle_ping(&page) {
            if send_event(&mut writer, response).is_err() {
                break;
            }
        }

        sleep_or_cancel(&ctx, ctx.ping_interval);
    }

    debug!("ping"; "client for {} went away", page);
    Ok(())
}

fn sleep_or_cancel(ctx: &ServeContext, period: Duration) {
    let cancel = ctx.scheduler.cancel_token();
    ctx.runtime.block_on(async {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(period) => {}
        }
    });
}
