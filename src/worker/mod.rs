//! Privileged worker loop.
//!
//! Runs in the root parent process, reading framed commands off the
//! socketpair one at a time. Handler failures are reported back as
//! `{success: false, error}` and never kill the worker; framing errors
//! end the loop, since the protocol cannot resynchronize.

pub mod provision;

use crate::ipc::{self, Command, WorkerResponse};
use provision::Provisioner;
use std::os::unix::net::UnixStream;
use tracing::{debug, error, info, warn};

/// Serve commands until the channel closes or framing breaks.
pub fn run(mut stream: UnixStream, provisioner: Provisioner) {
    info!("privileged worker started");
    loop {
        let frame = match ipc::read_frame(&mut stream) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("command channel closed, worker exiting");
                break;
            }
            Err(e) => {
                error!("fatal framing error on command channel: {e}");
                break;
            }
        };

        let response = match serde_json::from_slice::<Command>(&frame) {
            Ok(command) => {
                debug!("received command: {command:?}");
                dispatch(&provisioner, command)
            }
            Err(e) => {
                warn!("undecodable command frame: {e}");
                WorkerResponse::err("Invalid command")
            }
        };

        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode response: {e}");
                break;
            }
        };
        if let Err(e) = ipc::write_frame(&mut stream, &payload) {
            error!("failed to send response: {e}");
            break;
        }
    }
}

/// Run one command; every failure becomes an error response.
pub fn dispatch(provisioner: &Provisioner, command: Command) -> WorkerResponse {
    let result = match command {
        Command::WgExists { peer } => provisioner.wg_exists(&peer),
        Command::WgCreate { peer } => provisioner.wg_create(&peer),
        Command::WgDelete { peer } => provisioner.wg_delete(&peer),
        Command::BgpUpdate { peers } => provisioner.bgp_update(&peers),
    };
    match result {
        Ok(message) => WorkerResponse::ok(message),
        Err(e) => WorkerResponse::err(e.to_string()),
    }
}
