//! Upgrade admission
//!
//! Authentication and room lookup live outside the engine. The listener
//! captures the upgrade request and asks an [`UpgradeHandler`] which room
//! and role the connection belongs to.

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;

use crate::registry::{Role, RoomId};

/// What the listener saw of an upgrade request
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Request path, e.g. `/rooms/5/ws`
    pub path: String,
    /// Raw query string, without `?`
    pub query: Option<String>,
    /// Headers with lowercase names; non-UTF-8 values are skipped
    pub headers: HashMap<String, String>,
    /// Remote address of the TCP connection
    pub peer_addr: SocketAddr,
}

impl UpgradeRequest {
    /// Header value by lowercase name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// First query parameter named `name`, percent-decoded
    ///
    /// `+` reads as a space. Pairs that do not decode to UTF-8 are skipped.
    pub fn query_param(&self, name: &str) -> Option<Cow<'_, str>> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if decode_component(key)? != name {
                return None;
            }
            decode_component(value)
        })
    }
}

fn decode_component(raw: &str) -> Option<Cow<'_, str>> {
    if raw.contains('+') {
        let spaced = raw.replace('+', " ");
        return urlencoding::decode(&spaced)
            .ok()
            .map(|decoded| Cow::Owned(decoded.into_owned()));
    }
    urlencoding::decode(raw).ok()
}

/// Admission decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Register the connection in `room_id` with `role`
    Accept { room_id: RoomId, role: Role },
    /// Close the connection with this reason
    Reject(String),
}

/// Decides which room and role an upgraded connection gets
pub trait UpgradeHandler: Send + Sync + 'static {
    /// Decide which room and role an upgraded connection joins
    fn admit(&self, request: &UpgradeRequest) -> impl Future<Output = Admission> + Send;

    /// Called once the connection has been registered
    fn on_registered(
        &self,
        _request: &UpgradeRequest,
        _room_id: RoomId,
        _role: Role,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: Option<&str>) -> UpgradeRequest {
        UpgradeRequest {
            path: "/rooms/5/ws".to_string(),
            query: query.map(str::to_string),
            headers: HashMap::from([("x-user".to_string(), "7".to_string())]),
            peer_addr: "127.0.0.1:5000".parse().unwrap(),
        }
    }

    #[test]
    fn test_query_param() {
        let req = request(Some("room=5&role=owner&flag"));

        assert_eq!(req.query_param("room").as_deref(), Some("5"));
        assert_eq!(req.query_param("role").as_deref(), Some("owner"));
        assert_eq!(req.query_param("flag").as_deref(), Some(""));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(request(None).query_param("room"), None);
    }

    #[test]
    fn test_query_param_decoding() {
        let req = request(Some("role=est%69mator&name=Ada+Lovelace%21&na%6De=second&bad=%FF"));

        assert_eq!(req.query_param("role").as_deref(), Some("estimator"));
        assert_eq!(req.query_param("name").as_deref(), Some("Ada Lovelace!"));
        assert_eq!(req.query_param("bad"), None);
    }

    #[test]
    fn test_header() {
        let req = request(None);
        assert_eq!(req.header("x-user"), Some("7"));
        assert_eq!(req.header("authorization"), None);
    }
}
