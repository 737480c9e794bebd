//! Session identity supplied by the fronting authentication layer.
//!
//! Authentication happens before requests reach this service; the proxy
//! forwards the verified user, an optional session token and the admin flag
//! as headers. A missing token gets a fresh one so every upgrade registers
//! as its own session.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use swarmhub_hub::SessionIdentity;
use uuid::Uuid;

use crate::http::constants::{HEADER_ADMIN, HEADER_SESSION, HEADER_USER};
use crate::http::errors::ApiError;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Whether the request carries the admin flag.
pub(crate) fn is_admin(headers: &HeaderMap) -> bool {
    header_value(headers, HEADER_ADMIN).is_some_and(|value| {
        value.eq_ignore_ascii_case("true") || value == "1" || value.eq_ignore_ascii_case("yes")
    })
}

/// Build the identity of a socket session from request headers.
pub(crate) fn session_identity(
    headers: &HeaderMap,
    remote: SocketAddr,
) -> Result<SessionIdentity, ApiError> {
    let username = header_value(headers, HEADER_USER)
        .ok_or_else(|| ApiError::unauthorized("missing user identity"))?;
    let token = header_value(headers, HEADER_SESSION)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    Ok(SessionIdentity::new(username, token, remote.to_string()).admin(is_admin(headers)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use std::net::{IpAddr, Ipv4Addr};

    fn remote() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 40_000)
    }

    #[test]
    fn identity_reads_forwarded_headers() -> Result<(), Box<dyn std::error::Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_USER, HeaderValue::from_static("alice"));
        headers.insert(HEADER_SESSION, HeaderValue::from_static("T1"));
        headers.insert(HEADER_ADMIN, HeaderValue::from_static("TRUE"));

        let identity = session_identity(&headers, remote()).map_err(|err| err.message().to_string())?;
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.token, "T1");
        assert!(identity.is_admin);
        assert_eq!(identity.remote_addr, "10.0.0.7:40000");
        Ok(())
    }

    #[test]
    fn missing_token_is_generated_and_missing_user_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_USER, HeaderValue::from_static("bob"));
        let first = session_identity(&headers, remote()).map(|identity| identity.token);
        let second = session_identity(&headers, remote()).map(|identity| identity.token);
        assert!(matches!((first, second), (Ok(a), Ok(b)) if a != b && !a.is_empty()));
        assert!(!is_admin(&headers));

        let err = session_identity(&HeaderMap::new(), remote()).err();
        assert!(matches!(err, Some(err) if err.status == StatusCode::UNAUTHORIZED));
    }
}
