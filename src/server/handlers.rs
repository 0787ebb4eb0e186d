//! Request dispatcher
//!
//! Routes each request: the landing redirect and metrics snapshot
//! first, then path parsing and validation, then the git endpoints
//! (`info/refs`, `git-upload-pack`), the `go-get` and `docs` query
//! flags, and finally a proxy or redirect to the upstream tree.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use morpher_refs::{RefType, RefsInfo};
use std::time::Instant;
use tracing::{error, info, warn};

use super::goget::GoGetPage;
use super::metrics;
use super::upstream;
use super::AppState;
use crate::repo::{self, RepoInfo};
use crate::version;

pub const SERVER_HEADER: &str = "PKGRE Morpher";

const REFS_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";

/// GET / — redirect to the configured landing page
pub async fn root(State(state): State<AppState>) -> Response {
    Redirect::temporary(&state.config.http.redirect).into_response()
}

/// GET /_metrics — counters snapshot
pub async fn metrics_snapshot() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        metrics::render_json(),
    )
        .into_response()
}

/// Everything that is not `/` or `/_metrics`
pub async fn morph(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    let repo = match repo::parse_path(&path) {
        Ok(repo) => repo,
        Err(err) => {
            warn!("Can't parse repo path {}: {}", path, err);
            return not_found(err.to_string());
        }
    };

    if let Err(err) = repo.validate() {
        warn!("Invalid repo path {}: {}", path, err);
        return not_found(err.to_string());
    }

    // No version preference: send the client to the repository itself
    if repo.target.is_empty() {
        metrics::incr(&metrics::REDIRECTS);
        let url = format!("https://{}", repo.github_root());
        return Redirect::temporary(&url).into_response();
    }

    if repo.path == "git-upload-pack" {
        let url = format!("https://{}/git-upload-pack", repo.github_root());
        return proxy_or_error(request, &url).await;
    }

    let refs = match upstream::fetch_refs(&repo).await {
        Ok(refs) => refs,
        Err(err) => {
            warn!("Can't process refs data for {}: {}", repo.github_root(), err);
            return not_found(err.to_string());
        }
    };

    let (ref_type, ref_name) = version::suggest_head(&repo, &refs);

    if repo.path == "info/refs" {
        return refs_response(&path, &refs, ref_type, &ref_name);
    }

    if has_query_flag(&query, "go-get", Some("1")) {
        return goget_response(&state, &repo, ref_type, &ref_name);
    }

    if has_query_flag(&query, "docs", None) {
        metrics::incr(&metrics::DOCS);
        let url = docs_url(&state.config.main.domain, &repo);
        return Redirect::temporary(&url).into_response();
    }

    let tree_url = repo.github_url(&ref_name);

    if is_git_agent(&request) {
        return proxy_or_error(request, &tree_url).await;
    }

    metrics::incr(&metrics::REDIRECTS);
    Redirect::temporary(&tree_url).into_response()
}

/// Rewritten refs advertisement for `info/refs`
fn refs_response(path: &str, refs: &RefsInfo, ref_type: RefType, ref_name: &str) -> Response {
    if ref_name.is_empty() {
        metrics::incr(&metrics::MISSES);
        warn!("{} -> master (proper tag/branch not found)", path);
    } else {
        metrics::incr(&metrics::HITS);

        match ref_type {
            RefType::Tag => info!(
                "{} -> T:{} ({})",
                path,
                ref_name,
                refs.tag_sha(ref_name, true).unwrap_or_default()
            ),
            RefType::Branch => info!(
                "{} -> B:{} ({})",
                path,
                ref_name,
                refs.branch_sha(ref_name, true).unwrap_or_default()
            ),
            RefType::Unknown => {}
        }
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, REFS_CONTENT_TYPE)],
        refs.rewrite(ref_name, ref_type),
    )
        .into_response()
}

/// go-import meta page for `?go-get=1`
fn goget_response(state: &AppState, repo: &RepoInfo, ref_type: RefType, ref_name: &str) -> Response {
    if ref_type == RefType::Unknown {
        metrics::incr(&metrics::MISSES);

        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("Can't find tag or branch for target {}\n", repo.target),
        )
            .into_response();
    }

    let page = GoGetPage::new(&state.config.main.domain, repo, ref_name);
    let mut body = String::new();

    // A failed render is logged but whatever was written is still sent
    if let Err(err) = askama::Template::render_into(&page, &mut body) {
        metrics::incr(&metrics::ERRORS);
        error!("Can't render go get template: {}", err);
    }

    metrics::incr(&metrics::GOGET);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

/// pkg.go.dev target for the `?docs` flag
fn docs_url(domain: &str, repo: &RepoInfo) -> String {
    let mut url = format!(
        "https://pkg.go.dev/{}/{}@{}",
        domain,
        repo.full_path(),
        repo.target
    );

    if !repo.target.starts_with("v0.") && !repo.target.starts_with("v1.") {
        url.push_str("+incompatible");
    }

    url
}

async fn proxy_or_error(request: Request, url: &str) -> Response {
    match upstream::proxy(request, url).await {
        Ok(response) => response,
        Err(err) => {
            warn!("Can't proxy request to {}: {}", url, err);
            not_found(err.to_string())
        }
    }
}

fn not_found(message: String) -> Response {
    metrics::incr(&metrics::ERRORS);
    (StatusCode::NOT_FOUND, format!("{message}\n")).into_response()
}

fn has_query_flag(query: &str, name: &str, value: Option<&str>) -> bool {
    query.split('&').any(|pair| {
        let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
        key == name && value.map_or(true, |want| val == want)
    })
}

fn is_git_agent(request: &Request) -> bool {
    request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|ua| ua.starts_with("git/") || ua.starts_with("Go-http-client/"))
        .unwrap_or(false)
}

/// Adds `Server` and `X-Morpher-Time` to every response, including the
/// panic-recovery 500
pub async fn timing(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));

    if let Ok(value) = HeaderValue::from_str(&format!("{:?}", start.elapsed())) {
        headers.insert("X-Morpher-Time", value);
    }

    response
}

/// Panic recovery response; sits behind the timing middleware so the
/// 500 still carries the processing-time header
pub fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };

    error!("Recovered from panic in request handler: {}", detail);

    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::MorpherServer;
    use axum::body::Body;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn test_server() -> MorpherServer {
        let config: Config = toml::from_str(
            r#"
            [main]
            domain = "pkg.example.com"

            [http]
            redirect = "https://example.com/landing"
            "#,
        )
        .unwrap();

        MorpherServer::new(Arc::new(config))
    }

    async fn send(uri: &str) -> axum::response::Response {
        test_server()
            .router()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_to_landing() {
        let response = send("/").await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://example.com/landing"
        );
    }

    #[tokio::test]
    async fn test_every_response_carries_service_headers() {
        let response = send("/").await;

        assert_eq!(response.headers().get(header::SERVER).unwrap(), SERVER_HEADER);
        assert!(response.headers().contains_key("X-Morpher-Time"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_shape() {
        let response = send("/_metrics").await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        assert!(body.starts_with("{\n  \"hits\": "));
        assert!(body.ends_with("}\n"));

        for key in ["hits", "misses", "errors", "redirects", "docs", "goget"] {
            assert!(body.contains(&format!("\"{key}\":")));
        }
    }

    #[tokio::test]
    async fn test_invalid_name_is_404() {
        let before = metrics::snapshot().errors;
        let response = send("/x").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&body[..], b"Repo name is not valid\n");
        assert!(metrics::snapshot().errors > before);
    }

    #[tokio::test]
    async fn test_empty_target_redirects_upstream() {
        let before = metrics::snapshot().redirects;
        let response = send("/essentialkaos/ek").await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://github.com/essentialkaos/ek"
        );
        assert!(metrics::snapshot().redirects > before);
    }

    #[test]
    fn test_docs_url() {
        let repo = repo::parse_path("/essentialkaos/ek.v12/knf").unwrap();
        assert_eq!(
            docs_url("pkg.re", &repo),
            "https://pkg.go.dev/pkg.re/essentialkaos/ek.v12/knf@v12+incompatible"
        );

        let repo = repo::parse_path("/essentialkaos/ek.v1.2.3").unwrap();
        assert_eq!(
            docs_url("pkg.re", &repo),
            "https://pkg.go.dev/pkg.re/essentialkaos/ek.v1.2.3@v1.2.3"
        );

        let repo = repo::parse_path("/yaml.v0.9").unwrap();
        assert_eq!(
            docs_url("pkg.re", &repo),
            "https://pkg.go.dev/pkg.re/go-yaml/yaml.v0.9@v0.9"
        );
    }

    #[test]
    fn test_query_flags() {
        assert!(has_query_flag("go-get=1", "go-get", Some("1")));
        assert!(has_query_flag("a=b&go-get=1", "go-get", Some("1")));
        assert!(!has_query_flag("go-get=2", "go-get", Some("1")));
        assert!(!has_query_flag("", "go-get", Some("1")));

        assert!(has_query_flag("docs", "docs", None));
        assert!(has_query_flag("docs=1", "docs", None));
        assert!(!has_query_flag("nodocs", "docs", None));
    }
}
