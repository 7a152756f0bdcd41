//! Authentication endpoints.

pub mod login;
pub mod me;
pub mod password;
pub mod register;
pub mod types;
pub mod verification;

use axum::http::{header::USER_AGENT, HeaderMap};
use std::net::SocketAddr;

use crate::auth::utils::extract_client_ip;

/// Device fingerprint and client IP as recorded on sessions and used for
/// per-IP limits. Proxy headers win; the peer address covers direct clients
/// so the limiter always has a subject.
pub(crate) fn request_context(headers: &HeaderMap, peer: Option<SocketAddr>) -> (String, String) {
    let device = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ip = extract_client_ip(headers)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default();
    (device, ip)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_falls_back_to_peer_address() {
        let peer: SocketAddr = "10.1.2.3:55555".parse().expect("addr");
        let (_, ip) = request_context(&HeaderMap::new(), Some(peer));
        assert_eq!(ip, "10.1.2.3");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        let (_, ip) = request_context(&headers, Some(peer));
        assert_eq!(ip, "1.2.3.4");

        let (_, ip) = request_context(&HeaderMap::new(), None);
        assert!(ip.is_empty());
    }
}
