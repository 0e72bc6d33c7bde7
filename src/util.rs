use std::net::{Ipv4Addr, SocketAddr};

use tracing::warn;

use crate::config::ApiSection;

const API_TOKEN: &str = "SENTINEL_API_TOKEN";

const API_BIND: &str = "SENTINEL_BIND";

const DEFAULT_BIND: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

/// API token, the environment taking precedence over the config file
pub fn get_api_token(section: &ApiSection) -> Option<String> {
    let token_from_env = std::env::var(API_TOKEN).ok();
    token_from_env
        .filter(|token| !token.is_empty())
        .or_else(|| section.token.clone())
}

/// API bind address, the environment taking precedence over the config file
///
/// An unparsable address falls back to `127.0.0.1:8080`.
pub fn get_bind_addr(section: &ApiSection) -> SocketAddr {
    let bind = std::env::var(API_BIND).unwrap_or_else(|_| section.bind.clone());
    parse_bind(&bind)
}

fn parse_bind(bind: &str) -> SocketAddr {
    bind.parse().unwrap_or_else(|_| {
        warn!("invalid bind address '{bind}', using {DEFAULT_BIND}");
        DEFAULT_BIND
    })
}
