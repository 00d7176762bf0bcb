//! Unix backend: the analyzer leads its own process group

use std::io;
use tokio::process::Command;

pub(super) fn configure(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Send SIGTERM to the process group led by `pid`
pub(crate) fn terminate_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: killpg only delivers a signal and touches no memory we own.
    let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
