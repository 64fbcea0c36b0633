//! Daemon endpoint parsing
//!
//! Accepts the same host forms as the daemon's own `OLLAMA_HOST` handling:
//! `host`, `host:port`, `scheme://host[:port][/path]`, bare IPv4/IPv6 addresses.

use reqwest::Url;
use std::net::IpAddr;

/// Default daemon port when no scheme is given
pub const DEFAULT_PORT: u16 = 11434;

const DEFAULT_HOST: &str = "127.0.0.1";

/// Parse a host string into the daemon base URL
pub fn parse_host(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();

    let (scheme, rest, default_port) = match raw.split_once("://") {
        None => ("http", raw, DEFAULT_PORT),
        Some(("http", rest)) => ("http", rest, 80),
        Some(("https", rest)) => ("https", rest, 443),
        Some((scheme, rest)) => (scheme, rest, DEFAULT_PORT),
    };
    if scheme != "http" && scheme != "https" {
        return Err(format!("unsupported scheme {:?}", scheme));
    }

    let (hostport, path) = match rest.split_once('/') {
        Some((hostport, path)) => (hostport, path),
        None => (rest, ""),
    };

    let (host, port) = match split_host_port(hostport) {
        Some((host, port)) => (host.to_string(), port),
        None => {
            let trimmed = hostport.trim_start_matches('[').trim_end_matches(']');
            let host = if let Ok(ip) = trimmed.parse::<IpAddr>() {
                ip.to_string()
            } else if !hostport.is_empty() {
                hostport.to_string()
            } else {
                DEFAULT_HOST.to_string()
            };
            (host, None)
        }
    };

    // an unparsable or out-of-range port falls back to the default
    let port = port.and_then(|p| p.parse::<u16>().ok()).unwrap_or(default_port);

    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host
    };

    // keep a trailing slash so endpoint joins extend the path prefix
    let path = if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    };

    let url = format!("{}://{}:{}/{}", scheme, host, port, path);
    Url::parse(&url).map_err(|e| format!("invalid host {:?}: {}", raw, e))
}

/// Split `host:port` / `[v6]:port`. Returns `None` when there is no port part.
fn split_host_port(hostport: &str) -> Option<(&str, Option<&str>)> {
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return Some((host, Some(port)));
    }
    match hostport.rsplit_once(':') {
        // more than one colon without brackets is a bare IPv6 address
        Some((host, _)) if host.contains(':') => None,
        Some((host, port)) => Some((host, Some(port))),
        None => None,
    }
}
