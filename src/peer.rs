use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// One failed validation rule; every rule carries its own message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Description is longer than 30 characters")]
    DescriptionTooLong,
    #[error("Peer port not found in body")]
    MissingPort,
    #[error("Peer port is not a valid port number")]
    InvalidPort,
    #[error("Peer IP address not found in body")]
    MissingPeerIp,
    #[error("IP address {0} is not a valid IP address")]
    InvalidPeerIp(String),
    #[error("Local IPv4 address not found in body")]
    MissingLlIp4,
    #[error("Local IPv6 address not found in body")]
    MissingLlIp6,
    #[error("DN42 IPv4 address not found in body")]
    MissingDn42Ip4,
    #[error("DN42 IPv6 address not found in body")]
    MissingDn42Ip6,
    #[error("IP address {0} is not a valid IPv4 address")]
    InvalidIpv4(String),
    #[error("IP address {0} is not a valid IPv6 address")]
    InvalidIpv6(String),
    #[error("Peer public key not found in body")]
    MissingPubkey,
    #[error("Public key is not a valid base64 string")]
    InvalidPubkey,
    #[error("Pre-shared key not found in body")]
    MissingPsk,
    #[error("Pre-shared key is not a valid base64 string")]
    InvalidPsk,
}

/// Peering parameters as submitted by the remote operator.
///
/// Everything except the ASN is optional at the wire level; `validate`
/// enforces the rules before any provisioning happens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    #[serde(rename = "ASN")]
    pub asn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_psk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ll_ip4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ll_ip6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn42_ip4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn42_ip6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wgid: Option<u32>,
}

impl PeerInfo {
    /// Validate all peer attributes, filling in defaults.
    ///
    /// Checks are fail-fast: the first violated rule is returned.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        match &self.description {
            None => self.description = Some(format!("Peer_{}", self.asn)),
            Some(d) if d.len() > 30 => return Err(ValidationError::DescriptionTooLong),
            Some(_) => {}
        }

        match self.peer_port {
            None => return Err(ValidationError::MissingPort),
            Some(p) if !(1..=65535).contains(&p) => return Err(ValidationError::InvalidPort),
            Some(_) => {}
        }

        let peer_ip = self.peer_ip.as_deref().ok_or(ValidationError::MissingPeerIp)?;
        let ll_ip4 = self.ll_ip4.as_deref().ok_or(ValidationError::MissingLlIp4)?;
        let ll_ip6 = self.ll_ip6.as_deref().ok_or(ValidationError::MissingLlIp6)?;
        let dn42_ip4 = self.dn42_ip4.as_deref().ok_or(ValidationError::MissingDn42Ip4)?;
        let dn42_ip6 = self.dn42_ip6.as_deref().ok_or(ValidationError::MissingDn42Ip6)?;

        if peer_ip.parse::<IpAddr>().is_err() {
            return Err(ValidationError::InvalidPeerIp(peer_ip.to_string()));
        }
        for ip in [ll_ip4, dn42_ip4] {
            if ip.parse::<Ipv4Addr>().is_err() {
                return Err(ValidationError::InvalidIpv4(ip.to_string()));
            }
        }
        for ip in [ll_ip6, dn42_ip6] {
            if ip.parse::<Ipv6Addr>().is_err() {
                return Err(ValidationError::InvalidIpv6(ip.to_string()));
            }
        }

        let pubkey = self.peer_pubkey.as_deref().ok_or(ValidationError::MissingPubkey)?;
        if BASE64.decode(pubkey).is_err() {
            return Err(ValidationError::InvalidPubkey);
        }
        let psk = self.peer_psk.as_deref().ok_or(ValidationError::MissingPsk)?;
        if BASE64.decode(psk).is_err() {
            return Err(ValidationError::InvalidPsk);
        }

        if self.wgid.is_none() {
            self.wgid = Some(self.asn % 10_000);
        }

        Ok(())
    }

    /// Interface identifier; derived from the ASN when not supplied.
    pub fn wgid(&self) -> u32 {
        self.wgid.unwrap_or(self.asn % 10_000)
    }

    /// Kernel interface name, `wg<wgid>`.
    pub fn interface(&self) -> String {
        format!("wg{}", self.wgid())
    }

    /// Local WireGuard listen port for this peering.
    pub fn listen_port(&self) -> u16 {
        30_000 + (self.wgid() % 10_000) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_peer() -> PeerInfo {
        PeerInfo {
            asn: 4242422225,
            description: Some("potat0".to_string()),
            peer_ip: Some("192.0.2.7".to_string()),
            peer_port: Some(51820),
            peer_pubkey: Some("dGVzdC1wdWJrZXk=".to_string()),
            peer_psk: Some("dGVzdC1wc2s=".to_string()),
            ll_ip4: Some("169.254.0.1".to_string()),
            ll_ip6: Some("fe80::1".to_string()),
            dn42_ip4: Some("172.20.0.1".to_string()),
            dn42_ip6: Some("fd00::1".to_string()),
            wgid: None,
        }
    }

    #[test]
    fn test_valid_peer_passes() {
        let mut peer = valid_peer();
        assert!(peer.validate().is_ok());
        assert_eq!(peer.wgid, Some(2225));
    }

    #[test]
    fn test_description_defaults() {
        let mut peer = valid_peer();
        peer.description = None;
        peer.validate().unwrap();
        assert_eq!(peer.description.as_deref(), Some("Peer_4242422225"));
    }

    #[test]
    fn test_description_too_long() {
        let mut peer = valid_peer();
        peer.description = Some("x".repeat(31));
        assert_eq!(peer.validate(), Err(ValidationError::DescriptionTooLong));
    }

    #[test]
    fn test_port_boundaries() {
        let mut peer = valid_peer();
        peer.peer_port = None;
        assert_eq!(peer.validate(), Err(ValidationError::MissingPort));

        for port in [0, 65536, -1] {
            let mut peer = valid_peer();
            peer.peer_port = Some(port);
            assert_eq!(peer.validate(), Err(ValidationError::InvalidPort));
        }

        for port in [1, 65535] {
            let mut peer = valid_peer();
            peer.peer_port = Some(port);
            assert!(peer.validate().is_ok());
        }
    }

    #[test]
    fn test_peer_ip_any_family() {
        let mut peer = valid_peer();
        peer.peer_ip = Some("2001:db8::7".to_string());
        assert!(peer.validate().is_ok());

        let mut peer = valid_peer();
        peer.peer_ip = Some("not-an-ip".to_string());
        assert_eq!(
            peer.validate(),
            Err(ValidationError::InvalidPeerIp("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let mut peer = valid_peer();
        peer.ll_ip4 = Some("fe80::1".to_string());
        assert_eq!(
            peer.validate(),
            Err(ValidationError::InvalidIpv4("fe80::1".to_string()))
        );

        let mut peer = valid_peer();
        peer.dn42_ip6 = Some("172.20.0.1".to_string());
        assert_eq!(
            peer.validate(),
            Err(ValidationError::InvalidIpv6("172.20.0.1".to_string()))
        );
    }

    #[test]
    fn test_keys_must_be_base64() {
        let mut peer = valid_peer();
        peer.peer_pubkey = Some("not base64 !!".to_string());
        assert_eq!(peer.validate(), Err(ValidationError::InvalidPubkey));

        let mut peer = valid_peer();
        peer.peer_psk = Some("%%%".to_string());
        assert_eq!(peer.validate(), Err(ValidationError::InvalidPsk));
    }

    #[test]
    fn test_interface_derivation() {
        let peer = valid_peer();
        assert_eq!(peer.wgid(), 2225);
        assert_eq!(peer.interface(), "wg2225");
        assert_eq!(peer.listen_port(), 32225);

        let mut peer = valid_peer();
        peer.wgid = Some(7);
        assert_eq!(peer.interface(), "wg7");
        assert_eq!(peer.listen_port(), 30007);
    }

    #[test]
    fn test_serde_field_names() {
        let json = r#"{"ASN": 4242422225, "peer_ip": "192.0.2.7"}"#;
        let peer: PeerInfo = serde_json::from_str(json).unwrap();
        assert_eq!(peer.asn, 4242422225);
        assert_eq!(peer.peer_ip.as_deref(), Some("192.0.2.7"));
        assert!(peer.wgid.is_none());
    }
}
