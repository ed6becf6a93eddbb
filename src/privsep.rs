//! Two-process privilege split.
//!
//! The parent keeps root and runs the worker loop; the child drops to
//! the configured user/group and serves HTTP. The two halves share
//! nothing but the socketpair created before the fork.

use nix::unistd::{fork, setgid, setgroups, setuid, ForkResult, Group, User};
use std::os::unix::net::UnixStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrivsepError {
    #[error("failed to create socket pair: {0}")]
    SocketPair(std::io::Error),
    #[error("fork failed: {0}")]
    Fork(nix::Error),
    #[error("failed to look up {0}: {1}")]
    Lookup(&'static str, nix::Error),
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("failed to drop privileges: {0}")]
    Drop(nix::Error),
}

/// Which half of the split this process became.
pub enum Role {
    /// Parent: keeps root, owns the worker end of the channel.
    Worker(UnixStream),
    /// Child: runs the HTTP front-end, owns the client end.
    Frontend(UnixStream),
}

/// Create the command channel and fork.
pub fn split() -> Result<Role, PrivsepError> {
    let (worker_end, frontend_end) = UnixStream::pair().map_err(PrivsepError::SocketPair)?;
    match unsafe { fork() }.map_err(PrivsepError::Fork)? {
        ForkResult::Parent { .. } => {
            drop(frontend_end);
            Ok(Role::Worker(worker_end))
        }
        ForkResult::Child => {
            drop(worker_end);
            Ok(Role::Frontend(frontend_end))
        }
    }
}

/// Switch to the configured unprivileged identity. Group first, then
/// user; after `setuid` there is no way back.
pub fn drop_privileges(user: &str, group: &str) -> Result<(), PrivsepError> {
    let group_entry = Group::from_name(group)
        .map_err(|e| PrivsepError::Lookup("group", e))?
        .ok_or_else(|| PrivsepError::UnknownGroup(group.to_string()))?;
    let user_entry = User::from_name(user)
        .map_err(|e| PrivsepError::Lookup("user", e))?
        .ok_or_else(|| PrivsepError::UnknownUser(user.to_string()))?;

    setgroups(&[group_entry.gid]).map_err(PrivsepError::Drop)?;
    setgid(group_entry.gid).map_err(PrivsepError::Drop)?;
    setuid(user_entry.uid).map_err(PrivsepError::Drop)?;
    Ok(())
}

pub fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}
