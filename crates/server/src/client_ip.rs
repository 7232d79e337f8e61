//! Best-effort client address from proxy headers.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Headers consulted in order; the first valid non-loopback address wins.
const HEADER_PRECEDENCE: [&str; 7] = [
    "x-forwarded-for",
    "x-client-ip",
    "x-real-ip",
    "cf-connecting-ip",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
];

pub const LOCALHOST_DEV: &str = "localhost (dev)";
pub const UNKNOWN_IP: &str = "unknown";

/// Derive the caller's address from proxy headers.
///
/// Falls back to [`LOCALHOST_DEV`] when the proxy reported a loopback caller
/// or the server runs in dev mode, and to [`UNKNOWN_IP`] otherwise.
pub fn client_ip(headers: &HeaderMap, dev_mode: bool) -> String {
    for name in HEADER_PRECEDENCE {
        let Some(value) = header_str(headers, name) else {
            continue;
        };
        if let Some(ip) = value.split(',').find_map(public_addr) {
            return ip.to_string();
        }
    }

    let proxied_loopback = ["x-forwarded-for", "x-real-ip"].into_iter().any(|name| {
        header_str(headers, name)
            .and_then(|value| parse_addr(value.trim()))
            .is_some_and(|ip| ip.is_loopback())
    });

    if proxied_loopback || dev_mode {
        LOCALHOST_DEV.to_string()
    } else {
        UNKNOWN_IP.to_string()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn public_addr(entry: &str) -> Option<IpAddr> {
    let value = unwrap_forwarded(entry.trim());
    if value.eq_ignore_ascii_case("localhost") {
        return None;
    }
    parse_addr(value).filter(|ip| !ip.is_loopback())
}

/// `Forwarded` entries look like `for=192.0.2.60;proto=http`.
fn unwrap_forwarded(entry: &str) -> &str {
    entry
        .split(';')
        .map(str::trim)
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("for")
                .then(|| value.trim().trim_matches('"'))
        })
        .unwrap_or(entry)
}

fn parse_addr(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .or_else(|| {
            value
                .strip_prefix('[')
                .and_then(|v| v.strip_suffix(']'))
                .and_then(|v| v.parse().ok())
        })
}
