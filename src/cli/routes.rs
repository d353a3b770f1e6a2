//! `routes` and `resolve` commands: inspect how URLs map to pages.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use crate::config::HotpageConfig;
use crate::core::{PagePath, decode_request_path};
use crate::page::{locate_page, scan_pages};
use crate::route::{RouteIndex, RouteParams};
use crate::utils::plural::plural_count;

/// How a URL reached its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The URL names a page file directly
    Direct(PagePath),
    /// The URL matched a route pattern
    Route { page: PagePath, params: RouteParams },
}

/// Scan the pages directory and build the route index.
pub fn build_route_index(config: &HotpageConfig) -> Result<RouteIndex> {
    let pages = scan_pages(&config.pages.dir, &config.pages.extensions);
    RouteIndex::build(&pages).with_context(|| {
        format!(
            "conflicting routes in {}",
            config.root_relative(&config.pages.dir).display()
        )
    })
}

pub fn list_routes(config: &HotpageConfig) -> Result<()> {
    let index = build_route_index(config)?;
    print!("{}", render_routes(&index));
    Ok(())
}

fn render_routes(index: &RouteIndex) -> String {
    let width = index
        .routes()
        .iter()
        .map(|r| r.page.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for route in index.routes() {
        let page = format!("{:width$}", route.page.as_str());
        let page = if route.pattern.is_dynamic() {
            page.bright_yellow().to_string()
        } else {
            page
        };
        let _ = writeln!(out, "{}  {}", page, route.pattern.as_str().dimmed());
    }
    let summary = format!(
        "{} ({} dynamic)",
        plural_count(index.len(), "route"),
        index.dynamic_routes().count()
    );
    let _ = writeln!(out, "{}", summary.dimmed());
    out
}

pub fn resolve_url(config: &HotpageConfig, url: &str) -> Result<()> {
    let target = request_target(url);
    let index = build_route_index(config)?;

    match resolve_with(config, &index, &target)? {
        Some(resolution) => {
            print!("{}", render_resolution(&target, &resolution));
            Ok(())
        }
        None => bail!("no page matches `{}`", target),
    }
}

/// Direct page lookup first, then the route list in priority order.
fn resolve_with(config: &HotpageConfig, index: &RouteIndex, target: &str) -> Result<Option<Resolution>> {
    let path = decode_request_path(target);
    if let Some((page, _)) = locate_page(&config.pages.dir, &path, &config.pages.extensions) {
        return Ok(Some(Resolution::Direct(page)));
    }

    let resolved = index.resolve(target)?;
    Ok(resolved.map(|r| Resolution::Route {
        page: r.page,
        params: r.params,
    }))
}

fn render_resolution(target: &str, resolution: &Resolution) -> String {
    let mut out = String::new();
    match resolution {
        Resolution::Direct(page) => {
            let _ = writeln!(out, "{} -> {}", target, page.as_str().bright_green());
        }
        Resolution::Route { page, params } => {
            let _ = writeln!(out, "{} -> {}", target, page.as_str().bright_yellow());
            for (name, value) in params {
                let _ = writeln!(out, "  {} = {}", name.cyan(), value);
            }
        }
    }
    out
}

/// Path and query of a full URL; anything else is taken as a request path.
fn request_target(input: &str) -> String {
    match url::Url::parse(input) {
        Ok(url) if url.has_host() => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        _ => input.to_string(),
    }
}
