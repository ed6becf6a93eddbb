//! Rendering of per-peer WireGuard interface configs.
//!
//! The output is an OpenBSD `hostname.if` file: interface parameters,
//! one `wgpeer` line, and the routes tying the tunnel into its routing
//! domain.

use crate::peer::PeerInfo;
use tera::{Context, Tera};

/// Tunnel MTU used for every peering.
pub const MTU: u32 = 1420;

/// Field set of one rendered interface config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub rdomain: u32,
    pub inet: String,
    pub inet6: String,
    pub mtu: u32,
    pub wgkey: String,
    pub wgport: u16,
    pub peer_pubkey: String,
    pub peer_ip: String,
    pub peer_port: i64,
    pub peer_aip: String,
    pub peer_ll4: String,
    pub peer_ll6: String,
    pub wgid: u32,
}

impl InterfaceConfig {
    /// Build the render context for a validated peer.
    ///
    /// `wgkey` is the host-side private key for this interface. The
    /// local tunnel addresses come from `ll_ip4`/`ll_ip6`, the peer's
    /// overlay addresses from `dn42_ip4`/`dn42_ip6`.
    pub fn new(peer: &PeerInfo, wgkey: &str) -> Self {
        let dn42_ip4 = peer.dn42_ip4.clone().unwrap_or_default();
        InterfaceConfig {
            rdomain: peer.wgid(),
            inet: peer.ll_ip4.clone().unwrap_or_default(),
            inet6: peer.ll_ip6.clone().unwrap_or_default(),
            mtu: MTU,
            wgkey: wgkey.to_string(),
            wgport: peer.listen_port(),
            peer_pubkey: peer.peer_pubkey.clone().unwrap_or_default(),
            peer_ip: peer.peer_ip.clone().unwrap_or_default(),
            peer_port: peer.peer_port.unwrap_or_default(),
            peer_aip: format!("{dn42_ip4}/32"),
            peer_ll4: dn42_ip4,
            peer_ll6: peer.dn42_ip6.clone().unwrap_or_default(),
            wgid: peer.wgid(),
        }
    }

    /// Render the interface config using the embedded template.
    pub fn render(&self) -> Result<String, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template("wg.conf", include_str!("wg.conf.tera"))?;

        let mut context = Context::new();
        context.insert("rdomain", &self.rdomain);
        context.insert("inet", &self.inet);
        context.insert("inet6", &self.inet6);
        context.insert("mtu", &self.mtu);
        context.insert("wgkey", &self.wgkey);
        context.insert("wgport", &self.wgport);
        context.insert("peer_pubkey", &self.peer_pubkey);
        context.insert("peer_ip", &self.peer_ip);
        context.insert("peer_port", &self.peer_port);
        context.insert("peer_aip", &self.peer_aip);
        context.insert("peer_ll4", &self.peer_ll4);
        context.insert("peer_ll6", &self.peer_ll6);
        context.insert("wgid", &self.wgid);

        tera.render("wg.conf", &context)
    }
}
