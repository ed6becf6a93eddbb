//! Endpoint-test harness.
//!
//! Builds full front-end state over temporary directories, with a
//! scripted command runner behind a real worker loop on a background
//! thread, and a stub PGP verifier so no keyring is needed.

use crate::app::AppState;
use crate::config::{AppConfig, AutopeerConfig, BgpSettings, HttpConfig};
use crate::db::PeerDb;
use crate::gpg::{GpgError, PgpVerifier, Signer};
use crate::ipc::client::WorkerChannel;
use crate::session::TokenCache;
use crate::worker::provision::testing::ScriptedRunner;
use crate::worker::provision::{ProvisionPaths, Provisioner};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_ASN: u32 = 4242420257;
pub const TEST_EMAIL: &str = "op@example.net";
pub const TEST_FPR: &str = "8B7F0384CBE0272761D852EA0684E36E6CF9D4D4";

/// What the stub verifier should claim about the signature.
pub enum StubOutcome {
    Valid { fingerprint: String, email: String },
    BadSignature,
    ParseError,
}

pub fn valid_outcome() -> StubOutcome {
    StubOutcome::Valid {
        fingerprint: TEST_FPR.to_string(),
        email: TEST_EMAIL.to_string(),
    }
}

pub struct StubVerifier(pub StubOutcome);

#[async_trait]
impl PgpVerifier for StubVerifier {
    async fn locate_key(&self, _email: &str) -> Result<(), GpgError> {
        Ok(())
    }

    async fn verify_detached(
        &self,
        _body: &[u8],
        _signature: &[u8],
        _email: &str,
    ) -> Result<Signer, GpgError> {
        match &self.0 {
            StubOutcome::Valid { fingerprint, email } => Ok(Signer {
                fingerprint: fingerprint.clone(),
                emails: vec![email.clone()],
            }),
            StubOutcome::BadSignature => Err(GpgError::BadSignature("stub".to_string())),
            StubOutcome::ParseError => Err(GpgError::SignatureParse("stub".to_string())),
        }
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub runner: ScriptedRunner,
    pub dir: TempDir,
}

pub fn harness(outcome: StubOutcome) -> TestHarness {
    harness_with_runner(outcome, ScriptedRunner::new())
}

/// Build state with a registry fixture for [`TEST_ASN`] and a live
/// worker loop on the other end of the channel. Must run inside a tokio
/// runtime.
pub fn harness_with_runner(outcome: StubOutcome, runner: ScriptedRunner) -> TestHarness {
    let dir = TempDir::new().unwrap();
    crate::registry::fixtures::write_registry(
        &dir.path().join("registry"),
        TEST_ASN,
        TEST_EMAIL,
        TEST_FPR,
    );

    let config = Arc::new(AppConfig {
        autopeer: AutopeerConfig {
            user: "_autopeer".to_string(),
            group: "_autopeer".to_string(),
            registry: dir.path().join("registry"),
            db_dir: dir.path().join("db"),
            asn: TEST_ASN,
        },
        http: HttpConfig::default(),
        bgp: BgpSettings::default(),
    });

    let (ours, theirs) = std::os::unix::net::UnixStream::pair().unwrap();
    let paths = ProvisionPaths {
        wireguard_dir: dir.path().join("wireguard"),
        bgpd_conf: dir.path().join("bgpd.conf"),
        bgpd_staging: dir.path().join("bgpd.conf.staging"),
        netstart: PathBuf::from("/etc/netstart"),
    };
    let provisioner = Provisioner::with_parts(
        TEST_ASN,
        BgpSettings::default(),
        paths,
        Box::new(runner.clone()),
    );
    std::thread::spawn(move || crate::worker::run(theirs, provisioner));

    let state = AppState {
        config,
        tokens: Arc::new(TokenCache::new()),
        db: Arc::new(PeerDb::open_in_memory().unwrap()),
        worker: Arc::new(WorkerChannel::new(ours).unwrap()),
        verifier: Arc::new(StubVerifier(outcome)),
    };

    TestHarness { state, runner, dir }
}

/// Request carrying a syntactically valid signature header; the stub
/// verifier decides whether it counts.
pub fn signed_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-DN42-Signature", BASE64.encode(b"stub-signature"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
