//! Rendering of the complete OpenBGPD configuration.
//!
//! `/etc/bgpd.conf` always describes the full peer set; it is rebuilt
//! from scratch on every change and swapped in only after `bgpd -n`
//! accepts it.

use crate::config::BgpSettings;
use crate::peer::PeerInfo;
use serde::Serialize;
use tera::{Context, Tera};

#[derive(Debug, Serialize)]
struct NeighborContext {
    asn: u32,
    description: String,
    ll_ip4: String,
    ll_ip6: String,
    dn42_ip4: String,
    dn42_ip6: String,
}

/// Full bgpd.conf render input: local settings plus every peer.
#[derive(Debug)]
pub struct BgpConfig {
    asn: u32,
    settings: BgpSettings,
    neighbors: Vec<NeighborContext>,
}

impl BgpConfig {
    /// Assemble the config for the given (validated) peer list.
    pub fn new(asn: u32, settings: &BgpSettings, peers: &[PeerInfo]) -> Self {
        let neighbors = peers
            .iter()
            .map(|peer| NeighborContext {
                asn: peer.asn,
                description: peer
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Peer_{}", peer.asn)),
                ll_ip4: peer.ll_ip4.clone().unwrap_or_default(),
                ll_ip6: peer.ll_ip6.clone().unwrap_or_default(),
                dn42_ip4: peer.dn42_ip4.clone().unwrap_or_default(),
                dn42_ip6: peer.dn42_ip6.clone().unwrap_or_default(),
            })
            .collect();
        BgpConfig {
            asn,
            settings: settings.clone(),
            neighbors,
        }
    }

    pub fn render(&self) -> Result<String, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template("bgpd.conf", include_str!("bgpd.conf.tera"))?;

        let mut context = Context::new();
        context.insert("ASN", &self.asn);
        context.insert("router_id", &self.settings.router_id);
        context.insert("networks", &self.settings.networks);
        context.insert("roa", &self.settings.roa);
        context.insert("peers", &self.neighbors);

        tera.render("bgpd.conf", &context)
    }
}
