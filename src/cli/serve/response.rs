//! HTTP response helpers.

use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::compiler::CompileError;
use crate::route::RouteParams;
use crate::utils::mime::{self, types::PLAIN};

/// Header carrying the params of a dynamic route match, as a JSON object.
pub const ROUTE_PARAMS_HEADER: &str = "X-Route-Params";

/// Serve a built artifact, with route params when reached through a pattern.
pub fn respond_file(request: Request, path: &Path, params: Option<&RouteParams>) -> Result<()> {
    let content_type = mime::from_path(path);
    let mut headers = vec![header("Content-Type", content_type)?];
    if let Some(params) = params {
        headers.push(header(ROUTE_PARAMS_HEADER, &params_json(params)?)?);
    }

    if is_head_request(&request) {
        return send(request, 200, headers, Vec::new());
    }

    match fs::read(path) {
        Ok(body) => send(request, 200, headers, body),
        Err(e) => respond_text(
            request,
            500,
            &format!("artifact {} is missing: {e}", path.display()),
        ),
    }
}

/// 500 listing the page's compile errors.
pub fn respond_compile_errors(request: Request, errors: &[CompileError]) -> Result<()> {
    let mut body = String::from("500 Compilation Error\n\n");
    for error in errors {
        body.push_str(&error.to_string());
        body.push('\n');
    }
    respond_text(request, 500, &body)
}

pub fn respond_not_found(request: Request) -> Result<()> {
    respond_text(request, 404, "404 Not Found")
}

pub fn respond_bad_request(request: Request, reason: &str) -> Result<()> {
    respond_text(request, 400, &format!("400 Bad Request\n\n{reason}"))
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    respond_text(request, 503, "503 Service Unavailable")
}

/// 302 back to `location`, used once a compiler reload has finished.
pub fn respond_redirect(request: Request, location: &str) -> Result<()> {
    let response = Response::empty(StatusCode(302))
        .with_header(header("Location", location)?)
        .with_header(header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

fn respond_text(request: Request, status: u16, body: &str) -> Result<()> {
    let headers = vec![header("Content-Type", PLAIN)?];
    let body = if is_head_request(&request) {
        Vec::new()
    } else {
        body.as_bytes().to_vec()
    };
    send(request, status, headers, body)
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send(request: Request, status: u16, headers: Vec<Header>, body: Vec<u8>) -> Result<()> {
    let mut response = Response::from_data(body).with_status_code(StatusCode(status));
    for h in headers {
        response.add_header(h);
    }
    request.respond(response)?;
    Ok(())
}

/// JSON for the params header. Non-ASCII is `\u` escaped, headers are ASCII only.
fn params_json(params: &RouteParams) -> Result<String> {
    let json = serde_json::to_string(params)?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut [0; 2]) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

fn header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key.as_bytes(), value.as_bytes())
        .map_err(|()| anyhow!("invalid header {key}: {value}"))
}
