//! Read-only resolver over the DN42 registry tree.
//!
//! The registry is a flat-file object database: `data/aut-num/AS<asn>`,
//! `data/person/<handle>`, `data/mntner/<handle>`, each holding
//! `key: value` lines. Nothing is cached; every lookup re-reads the
//! files so registry updates are picked up without a restart.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("aut-num directory {0} does not exist")]
    MissingAutNumDir(PathBuf),
    #[error("ASN file {0} does not exist")]
    MissingAutNum(PathBuf),
    #[error("person file {0} does not exist")]
    MissingPerson(PathBuf),
    #[error("mntner file {0} does not exist")]
    MissingMntner(PathBuf),
    #[error("no {field} found in {path}")]
    MissingField { field: &'static str, path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Path of the aut-num object for an ASN.
pub fn aut_num(registry: &Path, asn: u32) -> Result<PathBuf, RegistryError> {
    if !registry.is_dir() {
        return Err(RegistryError::NotADirectory(registry.to_path_buf()));
    }
    let aut_num_dir = registry.join("data/aut-num");
    if !aut_num_dir.is_dir() {
        return Err(RegistryError::MissingAutNumDir(aut_num_dir));
    }
    let asn_file = aut_num_dir.join(format!("AS{asn}"));
    if !asn_file.is_file() {
        return Err(RegistryError::MissingAutNum(asn_file));
    }
    Ok(asn_file)
}

/// Contact email for an ASN, resolved `aut-num → tech-c → person → e-mail`.
pub fn email(registry: &Path, asn: u32) -> Result<String, RegistryError> {
    let asn_file = aut_num(registry, asn)?;
    let tech_c = first_value(&asn_file, "tech-c:")?;
    debug!("AS{asn} tech-c is {tech_c}");

    let person_file = registry.join("data/person").join(&tech_c);
    if !person_file.is_file() {
        return Err(RegistryError::MissingPerson(person_file));
    }
    let email = first_value(&person_file, "e-mail:")?;
    debug!("AS{asn} email is {email}");
    Ok(email)
}

/// Path of the maintainer object for an ASN, resolved through `mnt-by:`.
pub fn mntner(registry: &Path, asn: u32) -> Result<PathBuf, RegistryError> {
    let asn_file = aut_num(registry, asn)?;
    let mnt_by = first_value(&asn_file, "mnt-by:")?;
    debug!("AS{asn} mnt-by is {mnt_by}");

    let mnt_file = registry.join("data/mntner").join(&mnt_by);
    if !mnt_file.is_file() {
        return Err(RegistryError::MissingMntner(mnt_file));
    }
    Ok(mnt_file)
}

/// PGP fingerprint of the ASN's maintainer.
///
/// Scans the maintainer's `auth:` lines for the first `pgp-fingerprint`
/// entry and returns its value.
pub fn pgp_fingerprint(registry: &Path, asn: u32) -> Result<String, RegistryError> {
    let mnt_file = mntner(registry, asn)?;
    let content = read(&mnt_file)?;
    for line in content.lines() {
        if !line.starts_with("auth:") {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let _key = tokens.next();
        if tokens.next() == Some("pgp-fingerprint") {
            if let Some(fingerprint) = tokens.next() {
                debug!("AS{asn} pgp-fingerprint is {fingerprint}");
                return Ok(fingerprint.to_string());
            }
        }
    }
    Err(RegistryError::MissingField {
        field: "pgp-fingerprint",
        path: mnt_file,
    })
}

fn read(path: &Path) -> Result<String, RegistryError> {
    fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// First value for a colon-terminated key; whitespace-split, first match wins.
fn first_value(path: &Path, key: &'static str) -> Result<String, RegistryError> {
    let content = read(path)?;
    for line in content.lines() {
        if !line.starts_with(key) {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let _key = tokens.next();
        if let Some(value) = tokens.next() {
            return Ok(value.to_string());
        }
    }
    Err(RegistryError::MissingField {
        field: key,
        path: path.to_path_buf(),
    })
}
