//! Execution of provisioning commands against the host.
//!
//! All subprocess invocations go through the [`CommandRunner`] seam so
//! the handlers can be exercised without touching real interfaces.

use crate::bgp::BgpConfig;
use crate::config::BgpSettings;
use crate::peer::{PeerInfo, ValidationError};
use crate::wireguard::InterfaceConfig;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("interface {0} does not exist")]
    NotConfigured(String),
    #[error("interface {0} already exists")]
    AlreadyExists(String),
    #[error("failed to render {what}: {source}")]
    Render {
        what: &'static str,
        source: tera::Error,
    },
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("Failed to test bgpd config")]
    BgpTestFailed,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Subprocess seam; the worker only talks to the host through this.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<Output>;
    fn run_with_input(&self, program: &str, args: &[&str], input: &[u8])
        -> std::io::Result<Output>;
}

/// Runs the real host tools.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<Output> {
        Command::new(program).args(args).output()
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
    ) -> std::io::Result<Output> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }
        child.wait_with_output()
    }
}

/// Filesystem locations the worker owns.
pub struct ProvisionPaths {
    pub wireguard_dir: PathBuf,
    pub bgpd_conf: PathBuf,
    pub bgpd_staging: PathBuf,
    pub netstart: PathBuf,
}

impl Default for ProvisionPaths {
    fn default() -> Self {
        ProvisionPaths {
            wireguard_dir: PathBuf::from("/etc/wireguard"),
            bgpd_conf: PathBuf::from("/etc/bgpd.conf"),
            bgpd_staging: PathBuf::from("/tmp/bgpd.conf"),
            netstart: PathBuf::from("/etc/netstart"),
        }
    }
}

/// Owns interface and bgpd provisioning on behalf of the worker loop.
pub struct Provisioner {
    asn: u32,
    bgp: BgpSettings,
    paths: ProvisionPaths,
    runner: Box<dyn CommandRunner>,
}

pub struct WgKeypair {
    pub private_key: String,
    pub public_key: String,
}

impl Provisioner {
    pub fn new(asn: u32, bgp: BgpSettings) -> Self {
        Self::with_parts(asn, bgp, ProvisionPaths::default(), Box::new(SystemRunner))
    }

    pub fn with_parts(
        asn: u32,
        bgp: BgpSettings,
        paths: ProvisionPaths,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Provisioner {
            asn,
            bgp,
            paths,
            runner,
        }
    }

    /// `wg_exists`: succeed iff the kernel interface is present.
    pub fn wg_exists(&self, peer: &PeerInfo) -> Result<String, ProvisionError> {
        let interface = peer.interface();
        if self.interface_present(&interface)? {
            Ok(format!("interface {interface} exists"))
        } else {
            Err(ProvisionError::NotConfigured(interface))
        }
    }

    /// `wg_create`: render the interface config and bring the tunnel up.
    pub fn wg_create(&self, peer: &PeerInfo) -> Result<String, ProvisionError> {
        let mut peer = peer.clone();
        peer.validate()?;
        let interface = peer.interface();
        if self.interface_present(&interface)? {
            return Err(ProvisionError::AlreadyExists(interface));
        }

        let config_path = self.paths.wireguard_dir.join(format!("{interface}.conf"));
        let newly_created = !config_path.exists();

        let keypair = self.generate_keypair()?;
        let rendered = InterfaceConfig::new(&peer, &keypair.private_key)
            .render()
            .map_err(|source| ProvisionError::Render {
                what: "interface config",
                source,
            })?;

        fs::create_dir_all(&self.paths.wireguard_dir).map_err(|source| ProvisionError::Io {
            path: self.paths.wireguard_dir.clone(),
            source,
        })?;
        fs::write(&config_path, rendered).map_err(|source| ProvisionError::Io {
            path: config_path.clone(),
            source,
        })?;

        let netstart = self.paths.netstart.to_string_lossy().to_string();
        if let Err(e) = self.run_checked(&netstart, &[&interface]) {
            // only undo what this call created
            if newly_created {
                let _ = fs::remove_file(&config_path);
            }
            return Err(e);
        }

        info!("created interface {interface} for AS{}", peer.asn);
        Ok(format!(
            "interface {interface} created, host public key {}",
            keypair.public_key
        ))
    }

    /// `wg_delete`: tear down the tunnel. Missing pieces are warnings.
    pub fn wg_delete(&self, peer: &PeerInfo) -> Result<String, ProvisionError> {
        let mut peer = peer.clone();
        peer.validate()?;
        let interface = peer.interface();

        let config_path = self.paths.wireguard_dir.join(format!("{interface}.conf"));
        if config_path.exists() {
            fs::remove_file(&config_path).map_err(|source| ProvisionError::Io {
                path: config_path.clone(),
                source,
            })?;
        } else {
            warn!("config file {} was already absent", config_path.display());
        }

        if self.interface_present(&interface)? {
            self.run_checked("ifconfig", &[&interface, "destroy"])?;
        } else {
            warn!("interface {interface} was already absent");
        }

        info!("removed interface {interface} for AS{}", peer.asn);
        Ok(format!("interface {interface} removed"))
    }

    /// `bgp_update`: rebuild bgpd.conf for the full peer list and swap
    /// it in only after a successful dry run.
    pub fn bgp_update(&self, peers: &[PeerInfo]) -> Result<String, ProvisionError> {
        let mut validated = Vec::with_capacity(peers.len());
        for peer in peers {
            let mut peer = peer.clone();
            peer.validate()?;
            validated.push(peer);
        }

        let rendered = BgpConfig::new(self.asn, &self.bgp, &validated)
            .render()
            .map_err(|source| ProvisionError::Render {
                what: "bgpd config",
                source,
            })?;
        let staging = &self.paths.bgpd_staging;
        fs::write(staging, rendered).map_err(|source| ProvisionError::Io {
            path: staging.clone(),
            source,
        })?;

        let staging_str = staging.to_string_lossy().to_string();
        let output = self
            .runner
            .run("bgpd", &["-f", "-n", &staging_str])
            .map_err(|source| ProvisionError::Spawn {
                command: "bgpd".to_string(),
                source,
            })?;
        if !output.status.success() {
            warn!(
                "bgpd rejected the staged config: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            let _ = fs::remove_file(staging);
            return Err(ProvisionError::BgpTestFailed);
        }

        fs::rename(staging, &self.paths.bgpd_conf).map_err(|source| ProvisionError::Io {
            path: self.paths.bgpd_conf.clone(),
            source,
        })?;
        self.run_checked("rcctl", &["reload", "bgpd"])?;

        info!("bgpd reloaded with {} peers", validated.len());
        Ok(format!(
            "bgpd configuration reloaded with {} peers",
            validated.len()
        ))
    }

    fn interface_present(&self, interface: &str) -> Result<bool, ProvisionError> {
        let output = self
            .runner
            .run("ifconfig", &[interface])
            .map_err(|source| ProvisionError::Spawn {
                command: "ifconfig".to_string(),
                source,
            })?;
        Ok(output.status.success())
    }

    fn run_checked(&self, program: &str, args: &[&str]) -> Result<Output, ProvisionError> {
        let output = self
            .runner
            .run(program, args)
            .map_err(|source| ProvisionError::Spawn {
                command: program.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: format!("{program} {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Generate the host keypair for a new interface via `wg`.
    fn generate_keypair(&self) -> Result<WgKeypair, ProvisionError> {
        let output = self.run_checked("wg", &["genkey"])?;
        let private_key = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let output = self
            .runner
            .run_with_input("wg", &["pubkey"], private_key.as_bytes())
            .map_err(|source| ProvisionError::Spawn {
                command: "wg pubkey".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: "wg pubkey".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let public_key = String::from_utf8_lossy(&output.stdout).trim().to_string();

        Ok(WgKeypair {
            private_key,
            public_key,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;
    use std::path::Path;

    fn peer(asn: u32) -> PeerInfo {
        PeerInfo {
            asn,
            description: None,
            peer_ip: Some("192.0.2.7".to_string()),
            peer_port: Some(51820),
            peer_pubkey: Some("dGVzdC1wdWJrZXk=".to_string()),
            peer_psk: Some("dGVzdC1wc2s=".to_string()),
            ll_ip4: Some("169.254.0.1".to_string()),
            ll_ip6: Some("fe80::1".to_string()),
            dn42_ip4: Some("172.20.0.1".to_string()),
            dn42_ip6: Some("fd00::1".to_string()),
            wgid: Some(7),
        }
    }

    fn provisioner(dir: &Path, runner: ScriptedRunner) -> Provisioner {
        let paths = ProvisionPaths {
            wireguard_dir: dir.join("wireguard"),
            bgpd_conf: dir.join("bgpd.conf"),
            bgpd_staging: dir.join("bgpd.conf.staging"),
            netstart: PathBuf::from("/etc/netstart"),
        };
        Provisioner::with_parts(4242420257, BgpSettings::default(), paths, Box::new(runner))
    }

    #[test]
    fn test_wg_exists() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new().with_interface("wg7");
        let p = provisioner(dir.path(), runner.clone());
        assert!(p.wg_exists(&peer(4242420007)).is_ok());

        let absent = peer(4242420008);
        let result = provisioner(dir.path(), ScriptedRunner::new()).wg_exists(&absent);
        assert!(matches!(result, Err(ProvisionError::NotConfigured(_))));
    }

    #[test]
    fn test_wg_create_writes_config_and_starts_interface() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let p = provisioner(dir.path(), runner.clone());

        let message = p.wg_create(&peer(4242420007)).unwrap();
        assert!(message.contains("wg7"));
        assert!(message.contains("c2NyaXB0ZWQtcHVibGljLWtleQ=="));

        let config = std::fs::read_to_string(dir.path().join("wireguard/wg7.conf")).unwrap();
        assert!(config.contains("wgkey c2NyaXB0ZWQtcHJpdmtleQ=="));
        assert!(config.contains("wgpeer dGVzdC1wdWJrZXk="));
        assert!(runner.has_interface("wg7"));
        assert!(runner
            .calls()
            .iter()
            .any(|call| call.ends_with("netstart wg7")));
    }

    #[test]
    fn test_wg_create_refuses_existing_interface() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new().with_interface("wg7");
        let p = provisioner(dir.path(), runner);
        let result = p.wg_create(&peer(4242420007));
        assert!(matches!(result, Err(ProvisionError::AlreadyExists(_))));
    }

    #[test]
    fn test_wg_create_rolls_back_new_file_on_netstart_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new().fail_netstart();
        let p = provisioner(dir.path(), runner);
        let result = p.wg_create(&peer(4242420007));
        assert!(matches!(result, Err(ProvisionError::CommandFailed { .. })));
        assert!(!dir.path().join("wireguard/wg7.conf").exists());
    }

    #[test]
    fn test_wg_create_keeps_preexisting_file_on_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("wireguard")).unwrap();
        std::fs::write(dir.path().join("wireguard/wg7.conf"), "old").unwrap();

        let runner = ScriptedRunner::new().fail_netstart();
        let p = provisioner(dir.path(), runner);
        assert!(p.wg_create(&peer(4242420007)).is_err());
        assert!(dir.path().join("wireguard/wg7.conf").exists());
    }

    #[test]
    fn test_wg_create_validates_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let p = provisioner(dir.path(), runner.clone());
        let mut invalid = peer(4242420007);
        invalid.peer_port = Some(0);
        let result = p.wg_create(&invalid);
        assert!(matches!(result, Err(ProvisionError::Validation(_))));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_wg_delete_removes_file_and_interface() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("wireguard")).unwrap();
        std::fs::write(dir.path().join("wireguard/wg7.conf"), "conf").unwrap();

        let runner = ScriptedRunner::new().with_interface("wg7");
        let p = provisioner(dir.path(), runner.clone());
        p.wg_delete(&peer(4242420007)).unwrap();
        assert!(!dir.path().join("wireguard/wg7.conf").exists());
        assert!(!runner.has_interface("wg7"));
    }

    #[test]
    fn test_wg_delete_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = provisioner(dir.path(), ScriptedRunner::new());
        // neither the file nor the interface exists
        let message = p.wg_delete(&peer(4242420007)).unwrap();
        assert!(message.contains("wg7"));
    }

    #[test]
    fn test_bgp_update_swaps_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = provisioner(dir.path(), ScriptedRunner::new());
        p.bgp_update(&[peer(4242420007)]).unwrap();

        let live = std::fs::read_to_string(dir.path().join("bgpd.conf")).unwrap();
        assert!(live.contains("P1_asn=\"4242420007\""));
        assert!(!dir.path().join("bgpd.conf.staging").exists());
    }

    #[test]
    fn test_bgp_update_keeps_live_config_on_test_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("bgpd.conf"), "live config").unwrap();

        let p = provisioner(dir.path(), ScriptedRunner::new().fail_bgpd_test());
        let err = p.bgp_update(&[peer(4242420007)]).unwrap_err();
        assert!(matches!(err, ProvisionError::BgpTestFailed));
        assert_eq!(err.to_string(), "Failed to test bgpd config");

        let live = std::fs::read_to_string(dir.path().join("bgpd.conf")).unwrap();
        assert_eq!(live, "live config");
        assert!(!dir.path().join("bgpd.conf.staging").exists());
    }

    #[test]
    fn test_bgp_update_reload_runs_after_swap() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let p = provisioner(dir.path(), runner.clone());
        p.bgp_update(&[]).unwrap();
        let calls = runner.calls();
        let test_idx = calls.iter().position(|c| c.starts_with("bgpd -f -n")).unwrap();
        let reload_idx = calls.iter().position(|c| c == "rcctl reload bgpd").unwrap();
        assert!(test_idx < reload_idx);
    }
}
