//! Endpoint URL parsing and channel construction.
//!
//! Accepted schemes: `grpc://host[:port]` (plaintext TCP, default port
//! 40528) and `unix:///abs/path` or `unix://./rel/path`. TLS and plain
//! HTTP schemes are rejected; the server speaks plaintext gRPC only.

use std::path::PathBuf;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};

use crate::error::LlmError;

/// Default TCP port for `grpc://` endpoints.
pub const DEFAULT_GRPC_PORT: u16 = 40528;

fn reject(url: &str, reason: impl Into<String>) -> LlmError {
    LlmError::Endpoint {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Build a lazily-connecting channel for an accepted endpoint URL.
pub fn channel_for_url(url: &str) -> Result<Channel, LlmError> {
    if let Some(rest) = url.strip_prefix("grpc://") {
        if rest.is_empty() {
            return Err(reject(url, "missing host"));
        }
        let authority = if rest.contains(':') {
            rest.to_string()
        } else {
            format!("{rest}:{DEFAULT_GRPC_PORT}")
        };
        let endpoint = Endpoint::try_from(format!("http://{authority}"))
            .map_err(|source| LlmError::Transport { source })?;
        return Ok(endpoint.connect_lazy());
    }

    if let Some(rest) = url.strip_prefix("unix://") {
        if rest.is_empty() {
            return Err(reject(url, "missing socket path"));
        }
        if !(rest.starts_with('/') || rest.starts_with("./")) {
            return Err(reject(
                url,
                "socket path must be absolute or ./-relative",
            ));
        }
        let path = PathBuf::from(rest);
        // The authority is a placeholder; the connector ignores it.
        let endpoint = Endpoint::try_from("http://[::1]:1")
            .map_err(|source| LlmError::Transport { source })?;
        let channel = endpoint.connect_with_connector_lazy(tower::service_fn(move |_: Uri| {
            let path = path.clone();
            async move {
                Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?))
            }
        }));
        return Ok(channel);
    }

    let scheme = url.split("://").next().unwrap_or(url);
    match scheme {
        "grpcs" | "http" | "https" => Err(reject(
            url,
            format!("scheme {scheme} is not supported; use grpc:// or unix://"),
        )),
        other => Err(reject(url, format!("unrecognized scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::channel_for_url;
    use crate::error::LlmError;

    #[test]
    fn accepts_grpc_with_and_without_port() {
        assert!(channel_for_url("grpc://localhost").is_ok());
        assert!(channel_for_url("grpc://llm.internal:9000").is_ok());
    }

    #[test]
    fn accepts_unix_paths() {
        assert!(channel_for_url("unix:///run/llm.sock").is_ok());
        assert!(channel_for_url("unix://./llm.sock").is_ok());
    }

    #[test]
    fn rejects_tls_and_http_schemes() {
        for url in ["grpcs://host", "http://host", "https://host"] {
            match channel_for_url(url) {
                Err(LlmError::Endpoint { .. }) => {}
                Err(other) => panic!("{url} rejected with the wrong error: {other}"),
                Ok(_) => panic!("{url} must be rejected"),
            }
        }
    }

    #[test]
    fn rejects_bare_and_relative_unix_paths() {
        assert!(channel_for_url("unix://llm.sock").is_err());
        assert!(channel_for_url("unix://").is_err());
        assert!(channel_for_url("").is_err());
    }
}
