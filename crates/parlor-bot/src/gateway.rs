//! Admin reverse proxy.
//!
//! `/admin/api/{holo|twentyq|turtle}/...` rewrites onto the bot's own
//! surface: a leading `admin/` segment maps to the upstream `/admin/...`,
//! anything else to `/api/...`. Plain traffic rides an H2C client; requests
//! carrying an Upgrade header go over HTTP/1.1 and the upgraded byte
//! streams are relayed verbatim. Upstream failures answer 502 with a JSON
//! body.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioIo};

use crate::config::ProxyUpstreams;

type ProxyClient = Client<HttpConnector, Body>;

/// Shared proxy state: upstream table plus the two client flavors.
#[derive(Clone)]
pub struct GatewayState {
    upstreams: Arc<ProxyUpstreams>,
    h2c: ProxyClient,
    http1: ProxyClient,
}

impl GatewayState {
    /// State over the configured upstreams.
    pub fn new(upstreams: ProxyUpstreams) -> Self {
        Self {
            upstreams: Arc::new(upstreams),
            h2c: Client::builder(TokioExecutor::new())
                .http2_only(true)
                .build_http(),
            http1: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

/// Map the proxied remainder onto the upstream path.
///
/// `admin/...` stays an admin path; everything else becomes `/api/...`.
pub fn rewrite_path(rest: &str) -> String {
    let rest = rest.trim_start_matches('/');
    if rest == "admin" || rest.starts_with("admin/") {
        format!("/{rest}")
    } else if rest.is_empty() {
        "/api".to_string()
    } else {
        format!("/api/{rest}")
    }
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false)
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        axum::Json(serde_json::json!({ "error": "Service unavailable" })),
    )
        .into_response()
}

async fn proxy(
    State(state): State<GatewayState>,
    Path((bot, rest)): Path<(String, String)>,
    mut req: Request,
) -> Response {
    let Some(upstream) = state.upstreams.for_bot(&bot) else {
        tracing::warn!(bot = %bot, "proxy request for unknown bot");
        return bad_gateway();
    };

    let path = rewrite_path(&rest);
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let target = format!("{}{}{}", upstream.trim_end_matches('/'), path, query);
    let Ok(uri) = target.parse::<Uri>() else {
        tracing::warn!(target = %target, "proxy target failed to parse");
        return bad_gateway();
    };

    let upgrade_wanted = is_upgrade_request(req.headers());
    // The client half of a pending upgrade, if the server offered one.
    let client_upgrade = req.extensions_mut().remove::<hyper::upgrade::OnUpgrade>();
    *req.uri_mut() = uri;

    let client = if upgrade_wanted {
        &state.http1
    } else {
        &state.h2c
    };
    let mut upstream_response = match client.request(req).await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(bot = %bot, error = %error, "proxy upstream request failed");
            return bad_gateway();
        }
    };

    if upstream_response.status() == StatusCode::NOT_FOUND {
        tracing::warn!(bot = %bot, path = %path, "proxy upstream returned 404");
    }

    if upgrade_wanted && upstream_response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
        if let Some(client_upgrade) = client_upgrade {
            tokio::spawn(async move {
                match (client_upgrade.await, upstream_upgrade.await) {
                    (Ok(client_io), Ok(upstream_io)) => {
                        let mut client_io = TokioIo::new(client_io);
                        let mut upstream_io = TokioIo::new(upstream_io);
                        if let Err(error) =
                            tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await
                        {
                            tracing::debug!(error = %error, "upgraded relay closed");
                        }
                    }
                    (client_result, upstream_result) => {
                        tracing::warn!(
                            client_ok = client_result.is_ok(),
                            upstream_ok = upstream_result.is_ok(),
                            "upgrade handshake did not complete on both sides"
                        );
                    }
                }
            });
        }
    }

    upstream_response.map(Body::new).into_response()
}

/// Admin proxy router.
pub fn admin_router(upstreams: ProxyUpstreams) -> Router {
    Router::new()
        .route("/admin/api/{bot}/{*rest}", any(proxy))
        .with_state(GatewayState::new(upstreams))
}

#[cfg(test)]
mod tests {
    use super::rewrite_path;

    #[test]
    fn plain_paths_map_to_the_api_surface() {
        assert_eq!(rewrite_path("status"), "/api/status");
        assert_eq!(rewrite_path("soup/state/c1"), "/api/soup/state/c1");
        assert_eq!(rewrite_path(""), "/api");
    }

    #[test]
    fn admin_paths_stay_on_the_admin_surface() {
        assert_eq!(rewrite_path("admin/metrics"), "/admin/metrics");
        assert_eq!(rewrite_path("admin"), "/admin");
        // Only a whole leading segment counts.
        assert_eq!(rewrite_path("administrate"), "/api/administrate");
    }
}
