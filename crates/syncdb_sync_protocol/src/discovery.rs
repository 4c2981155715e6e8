//! Discovery service messages.
//!
//! A node announces itself with its addresses, company, listener port and
//! node id, and gets back every node registered for the same company,
//! itself included.

use serde::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Discovery response: node id to node location.
pub type PeerMap = BTreeMap<String, NodeInfo>;

/// Where a node can be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Comma-separated list of addresses.
    #[serde(alias = "IP", default)]
    pub ip: String,
    /// Listener port.
    #[serde(alias = "Port", default, deserialize_with = "port_text")]
    pub port: String,
    /// Script to run when this entry describes the local node.
    #[serde(
        alias = "Rum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub script_payload: Option<String>,
}

impl NodeInfo {
    /// Creates a node entry without a script.
    pub fn new(ip: impl Into<String>, port: impl ToString) -> Self {
        Self {
            ip: ip.into(),
            port: port.to_string(),
            script_payload: None,
        }
    }

    /// Returns every listed address, trimmed, skipping empty items.
    pub fn addresses(&self) -> Vec<&str> {
        self.ip
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Returns the script payload if it is non-empty.
    #[must_use]
    pub fn script(&self) -> Option<&str> {
        self.script_payload
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Returns true if `addr` is a loopback address.
pub fn is_loopback(addr: &str) -> bool {
    addr.eq_ignore_ascii_case("localhost")
        || addr.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

/// A node's announcement to the discovery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Local non-loopback IPv4 addresses.
    pub my_ips: Vec<String>,
    /// Company (replica group) id.
    pub company: String,
    /// Current listener port.
    pub my_port: String,
    /// Local node id.
    pub my_node_id: String,
}

impl DiscoveryRequest {
    /// Returns the request as URL query pairs (`i`, `c`, `p`, `id`).
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("i", self.my_ips.join(",")),
            ("c", self.company.clone()),
            ("p", self.my_port.clone()),
            ("id", self.my_node_id.clone()),
        ]
    }
}

/// Decodes a discovery response.
pub fn decode_peers(bytes: &[u8]) -> crate::ProtocolResult<PeerMap> {
    Ok(serde_json::from_slice::<Option<PeerMap>>(bytes)?.unwrap_or_default())
}

fn port_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => n.to_string(),
        Some(Raw::Text(s)) => s,
        None => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_response_shape() {
        let json = br#"{
            "n1": {"IP": "10.0.0.5,127.0.0.1", "Port": "4321", "Rum": ""},
            "n2": {"ip": "10.0.0.6", "port": 5555, "scriptPayload": "(print 1)"}
        }"#;
        let peers = decode_peers(json).unwrap();

        let n1 = &peers["n1"];
        assert_eq!(n1.addresses(), vec!["10.0.0.5", "127.0.0.1"]);
        assert_eq!(n1.port, "4321");
        assert_eq!(n1.script(), None);

        let n2 = &peers["n2"];
        assert_eq!(n2.port, "5555");
        assert_eq!(n2.script(), Some("(print 1)"));
    }

    #[test]
    fn empty_response() {
        assert!(decode_peers(b"null").unwrap().is_empty());
        assert!(decode_peers(b"{}").unwrap().is_empty());
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(is_loopback("localhost"));
        assert!(!is_loopback("192.168.1.20"));
        assert!(!is_loopback("not-an-ip"));
    }

    #[test]
    fn query_pairs_join_addresses() {
        let req = DiscoveryRequest {
            my_ips: vec!["10.0.0.5".into(), "10.0.0.7".into()],
            company: "acme".into(),
            my_port: "4000".into(),
            my_node_id: "n1".into(),
        };
        let pairs = req.query_pairs();
        assert_eq!(pairs[0], ("i", "10.0.0.5,10.0.0.7".to_string()));
        assert_eq!(pairs[3], ("id", "n1".to_string()));
    }

    #[test]
    fn node_info_serializes_camel_case() {
        let json = serde_json::to_value(NodeInfo::new("10.0.0.5", 80)).unwrap();
        assert_eq!(json, serde_json::json!({"ip": "10.0.0.5", "port": "80"}));
    }
}
