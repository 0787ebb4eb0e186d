//! Upstream GitHub access
//!
//! Two pooled clients: short timeouts for refs discovery, longer ones
//! for pack proxying. Both pools live for the process lifetime.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header;
use axum::response::Response;
use morpher_refs::RefsInfo;
use once_cell::sync::Lazy;
use std::time::Duration;
use thiserror::Error;

use crate::repo::RepoInfo;

pub const USER_AGENT: &str = concat!("PKGRE-Morpher/", env!("CARGO_PKG_VERSION"));

const REFS_TIMEOUT: Duration = Duration::from_secs(3);
const PROXY_TIMEOUT: Duration = Duration::from_secs(15);

static REFS_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(REFS_TIMEOUT)
        .timeout(REFS_TIMEOUT)
        .build()
        .expect("refs HTTP client")
});

static PROXY_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(REFS_TIMEOUT)
        .timeout(PROXY_TIMEOUT)
        .build()
        .expect("proxy HTTP client")
});

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("GitHub returned status code {0}")]
    Status(u16),

    #[error("GitHub returned empty response")]
    Empty,

    #[error("Can't read GitHub response: {0}")]
    Io(#[from] reqwest::Error),

    #[error("Can't parse refs data: {0}")]
    Refs(#[from] morpher_refs::Error),

    #[error("Can't proxy request: {0}")]
    Proxy(String),
}

/// Fetch and parse the upstream refs advertisement
pub async fn fetch_refs(repo: &RepoInfo) -> Result<RefsInfo, UpstreamError> {
    let url = format!(
        "https://{}.git/info/refs?service=git-upload-pack",
        repo.github_root()
    );

    let response = REFS_CLIENT.get(&url).send().await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(UpstreamError::Status(response.status().as_u16()));
    }

    let body = response.bytes().await?;

    if body.is_empty() {
        return Err(UpstreamError::Empty);
    }

    Ok(RefsInfo::parse(&body)?)
}

/// Forward the request verbatim to the given upstream URL and stream
/// the response back. The hop-by-hop `Connection` header is stripped in
/// both directions.
pub async fn proxy(request: Request, url: &str) -> Result<Response, UpstreamError> {
    let (parts, body) = request.into_parts();

    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| UpstreamError::Proxy(e.to_string()))?;

    let mut headers = parts.headers;
    headers.remove(header::CONNECTION);
    headers.remove(header::HOST);

    let upstream = PROXY_CLIENT
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    response_headers.remove(header::CONNECTION);

    let mut builder = Response::builder().status(status);

    if let Some(headers) = builder.headers_mut() {
        *headers = response_headers;
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| UpstreamError::Proxy(e.to_string()))
}
