//! Bot HTTP surface, admin reverse proxy, and service wiring.

#![allow(missing_docs)]

mod config;
mod gateway;
mod observability;
mod server;
mod state;

pub use config::{BotConfig, DEFAULT_BOT_PORT, DEFAULT_LLM_URL, ProxyUpstreams};
pub use gateway::{GatewayState, admin_router, rewrite_path};
pub use observability::init_tracing;
pub use server::{ApiError, TURN_TIMEOUT_SECS, router};
pub use state::{FamilyBackends, Services, build_services, build_valkey_services};
