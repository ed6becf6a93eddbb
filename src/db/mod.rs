//! SQLite-backed peer store.
//!
//! One row per established peering; every tunnel attribute carries a
//! UNIQUE constraint so two peers can never share a port, address or
//! key. Schema changes go through the ordered migration list, tracked
//! with `PRAGMA user_version`.

use crate::peer::PeerInfo;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS peers (
        ASN INTEGER PRIMARY KEY NOT NULL,
        DESCRIPTION TEXT NOT NULL,
        PEER_IP TEXT NOT NULL UNIQUE,
        PEER_PORT INTEGER NOT NULL UNIQUE,
        PEER_PUBKEY TEXT NOT NULL UNIQUE,
        PEER_PSK TEXT NOT NULL UNIQUE,
        LL_IP4 TEXT NOT NULL UNIQUE,
        LL_IP6 TEXT NOT NULL UNIQUE,
        DN42_IP4 TEXT NOT NULL UNIQUE,
        DN42_IP6 TEXT NOT NULL UNIQUE,
        WGID INTEGER NOT NULL UNIQUE
    );
    CREATE INDEX IF NOT EXISTS idx_peer_port ON peers (PEER_PORT);
    CREATE INDEX IF NOT EXISTS idx_wgid ON peers (WGID);",
];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

pub struct PeerDb {
    conn: Mutex<Connection>,
}

impl PeerDb {
    /// Open (or create) `peers.db` inside the given directory.
    pub fn open(db_dir: &Path) -> Result<Self, DbError> {
        std::fs::create_dir_all(db_dir).map_err(|source| DbError::Io {
            path: db_dir.to_path_buf(),
            source,
        })?;
        let conn = Connection::open(db_dir.join("peers.db"))?;
        let db = PeerDb {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let db = PeerDb {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DbError> {
        let conn = self.conn.lock();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        for (idx, migration) in MIGRATIONS.iter().enumerate() {
            let migration_id = (idx + 1) as i64;
            if migration_id <= version {
                continue;
            }
            conn.execute_batch(migration)?;
            conn.pragma_update(None, "user_version", migration_id)?;
        }
        Ok(())
    }

    pub fn insert(&self, peer: &PeerInfo) -> Result<(), DbError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO peers (ASN, DESCRIPTION, PEER_IP, PEER_PORT, PEER_PUBKEY, PEER_PSK,
                                LL_IP4, LL_IP6, DN42_IP4, DN42_IP6, WGID)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                peer.asn,
                peer.description,
                peer.peer_ip,
                peer.peer_port,
                peer.peer_pubkey,
                peer.peer_psk,
                peer.ll_ip4,
                peer.ll_ip6,
                peer.dn42_ip4,
                peer.dn42_ip6,
                peer.wgid(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, asn: u32) -> Result<Option<PeerInfo>, DbError> {
        let conn = self.conn.lock();
        let peer = conn
            .query_row(
                "SELECT ASN, DESCRIPTION, PEER_IP, PEER_PORT, PEER_PUBKEY, PEER_PSK,
                        LL_IP4, LL_IP6, DN42_IP4, DN42_IP6, WGID
                 FROM peers WHERE ASN = ?1",
                params![asn],
                row_to_peer,
            )
            .optional()?;
        Ok(peer)
    }

    /// Remove the ASN's row; `false` when no such peering was stored.
    pub fn remove(&self, asn: u32) -> Result<bool, DbError> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM peers WHERE ASN = ?1", params![asn])?;
        Ok(affected > 0)
    }

    /// All stored peerings, ordered by ASN.
    pub fn list(&self) -> Result<Vec<PeerInfo>, DbError> {
        let conn = self.conn.lock();
        let mut statement = conn.prepare(
            "SELECT ASN, DESCRIPTION, PEER_IP, PEER_PORT, PEER_PUBKEY, PEER_PSK,
                    LL_IP4, LL_IP6, DN42_IP4, DN42_IP6, WGID
             FROM peers ORDER BY ASN",
        )?;
        let peers = statement
            .query_map([], row_to_peer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(peers)
    }

    /// Check the unique tunnel attributes against another stored peer.
    pub fn conflicts(&self, peer: &PeerInfo) -> Result<Option<String>, DbError> {
        let conn = self.conn.lock();
        let other: Option<u32> = conn
            .query_row(
                "SELECT ASN FROM peers
                 WHERE ASN != ?1
                   AND (PEER_IP = ?2 OR PEER_PORT = ?3 OR PEER_PUBKEY = ?4 OR PEER_PSK = ?5
                        OR LL_IP4 = ?6 OR LL_IP6 = ?7 OR DN42_IP4 = ?8 OR DN42_IP6 = ?9
                        OR WGID = ?10)
                 LIMIT 1",
                params![
                    peer.asn,
                    peer.peer_ip,
                    peer.peer_port,
                    peer.peer_pubkey,
                    peer.peer_psk,
                    peer.ll_ip4,
                    peer.ll_ip6,
                    peer.dn42_ip4,
                    peer.dn42_ip6,
                    peer.wgid(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(other.map(|asn| format!("peer attributes collide with AS{asn}")))
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeerInfo> {
    Ok(PeerInfo {
        asn: row.get(0)?,
        description: Some(row.get(1)?),
        peer_ip: Some(row.get(2)?),
        peer_port: Some(row.get(3)?),
        peer_pubkey: Some(row.get(4)?),
        peer_psk: Some(row.get(5)?),
        ll_ip4: Some(row.get(6)?),
        ll_ip6: Some(row.get(7)?),
        dn42_ip4: Some(row.get(8)?),
        dn42_ip6: Some(row.get(9)?),
        wgid: Some(row.get(10)?),
    })
}
