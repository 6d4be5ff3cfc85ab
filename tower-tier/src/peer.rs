use std::net::SocketAddr;

use http::Extensions;
use http::Request;
use http::header::AUTHORIZATION;

/// Address used when the hosting server records no peer address.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// The caller's network address (IP only) as recorded by the hosting server.
///
/// Looks for axum's `ConnectInfo<SocketAddr>` (with the `axum` feature) and then
/// a bare `SocketAddr` request extension.
pub fn client_address<B>(req: &Request<B>) -> String {
    connect_info(req.extensions())
        .or_else(|| req.extensions().get::<SocketAddr>().copied())
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

/// The raw `Authorization` header, if present and valid UTF-8.
pub(crate) fn authorization<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

#[cfg(feature = "axum")]
fn connect_info(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
}

#[cfg(not(feature = "axum"))]
fn connect_info(_extensions: &Extensions) -> Option<SocketAddr> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_comes_from_socket_extension() {
        let mut req = Request::new(());
        req.extensions_mut()
            .insert("203.0.113.9:51234".parse::<SocketAddr>().unwrap());
        assert_eq!(client_address(&req), "203.0.113.9");
    }

    #[test]
    fn missing_address_is_unknown() {
        assert_eq!(client_address(&Request::new(())), UNKNOWN_ADDRESS);
    }

    #[cfg(feature = "axum")]
    #[test]
    fn connect_info_takes_precedence() {
        let mut req = Request::new(());
        req.extensions_mut()
            .insert("10.1.1.1:80".parse::<SocketAddr>().unwrap());
        req.extensions_mut().insert(axum::extract::ConnectInfo(
            "[2001:db8::1]:443".parse::<SocketAddr>().unwrap(),
        ));
        assert_eq!(client_address(&req), "2001:db8::1");
    }

    #[test]
    fn non_utf8_authorization_is_ignored() {
        let req = Request::builder()
            .header(AUTHORIZATION, http::HeaderValue::from_bytes(b"Bearer \xff").unwrap())
            .body(())
            .unwrap();
        assert_eq!(authorization(&req), None);
    }
}
