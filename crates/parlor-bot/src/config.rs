//! Environment-driven configuration.
//!
//! Every knob has an env var; invalid values fail startup rather than being
//! silently replaced. CLI flags (see `main.rs`) override the environment.

use anyhow::{Context, Result, bail};

/// Default bot HTTP port.
pub const DEFAULT_BOT_PORT: u16 = 40258;
/// Default LLM endpoint.
pub const DEFAULT_LLM_URL: &str = "grpc://127.0.0.1:40528";
/// Default store endpoint.
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379/0";

/// Admin-proxy upstream base URLs, one per bot.
#[derive(Debug, Clone, Default)]
pub struct ProxyUpstreams {
    /// `holo` bot upstream, e.g. `http://127.0.0.1:40250`.
    pub holo: Option<String>,
    /// `twentyq` bot upstream.
    pub twentyq: Option<String>,
    /// `turtle` bot upstream.
    pub turtle: Option<String>,
}

impl ProxyUpstreams {
    /// Upstream for a path segment, if configured.
    pub fn for_bot(&self, bot: &str) -> Option<&str> {
        match bot {
            "holo" => self.holo.as_deref(),
            "twentyq" => self.twentyq.as_deref(),
            "turtle" => self.turtle.as_deref(),
            _ => None,
        }
    }

    /// Whether any upstream is configured.
    pub fn any(&self) -> bool {
        self.holo.is_some() || self.twentyq.is_some() || self.turtle.is_some()
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot HTTP port.
    pub bot_port: u16,
    /// Admin proxy port; the proxy is disabled when unset.
    pub admin_port: Option<u16>,
    /// Store URL (`redis://` or `redis+unix://`).
    pub store_url: String,
    /// LLM endpoint (`grpc://` or `unix://`).
    pub llm_url: String,
    /// API key forwarded to the LLM server.
    pub llm_api_key: Option<String>,
    /// Admin proxy upstreams.
    pub upstreams: ProxyUpstreams,
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_port(name: &str) -> Result<Option<u16>> {
    match env_trimmed(name) {
        Some(raw) => {
            let port = raw
                .parse::<u16>()
                .with_context(|| format!("{name} must be a port number, got {raw:?}"))?;
            if port == 0 {
                bail!("{name} must be non-zero");
            }
            Ok(Some(port))
        }
        None => Ok(None),
    }
}

/// Build the store URL from the endpoint env family.
///
/// `VALKEY_URL` wins; otherwise `PARLOR_STORE_SOCKET_PATH` or the
/// host/port pair.
fn store_url_from_env() -> Result<String> {
    if let Some(url) = env_trimmed("VALKEY_URL") {
        return Ok(url);
    }
    if let Some(path) = env_trimmed("PARLOR_STORE_SOCKET_PATH") {
        if !path.starts_with('/') {
            bail!("PARLOR_STORE_SOCKET_PATH must be absolute, got {path:?}");
        }
        return Ok(format!("redis+unix://{path}"));
    }
    let host = env_trimmed("PARLOR_STORE_HOST");
    let port = env_port("PARLOR_STORE_PORT")?;
    match (host, port) {
        (None, None) => Ok(DEFAULT_STORE_URL.to_string()),
        (host, port) => Ok(format!(
            "redis://{}:{}/0",
            host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port.unwrap_or(6379)
        )),
    }
}

impl BotConfig {
    /// Read the full configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let bot_port = env_port("PARLOR_BOT_PORT")?.unwrap_or(DEFAULT_BOT_PORT);
        let admin_port = env_port("PARLOR_ADMIN_PORT")?;
        let llm_url = env_trimmed("PARLOR_LLM_URL").unwrap_or_else(|| DEFAULT_LLM_URL.to_string());
        if !(llm_url.starts_with("grpc://") || llm_url.starts_with("unix://")) {
            bail!("PARLOR_LLM_URL must use grpc:// or unix://, got {llm_url:?}");
        }
        Ok(Self {
            bot_port,
            admin_port,
            store_url: store_url_from_env()?,
            llm_url,
            llm_api_key: env_trimmed("PARLOR_LLM_API_KEY"),
            upstreams: ProxyUpstreams {
                holo: env_trimmed("PARLOR_ADMIN_UPSTREAM_HOLO"),
                twentyq: env_trimmed("PARLOR_ADMIN_UPSTREAM_TWENTYQ"),
                turtle: env_trimmed("PARLOR_ADMIN_UPSTREAM_TURTLE"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ProxyUpstreams;

    #[test]
    fn upstream_lookup_only_knows_the_three_bots() {
        let upstreams = ProxyUpstreams {
            holo: Some("http://127.0.0.1:1".to_string()),
            twentyq: Some("http://127.0.0.1:2".to_string()),
            turtle: None,
        };
        assert_eq!(upstreams.for_bot("holo"), Some("http://127.0.0.1:1"));
        assert_eq!(upstreams.for_bot("twentyq"), Some("http://127.0.0.1:2"));
        assert_eq!(upstreams.for_bot("turtle"), None);
        assert_eq!(upstreams.for_bot("other"), None);
        assert!(upstreams.any());
    }
}
