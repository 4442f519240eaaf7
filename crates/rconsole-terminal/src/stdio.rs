use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd};

use super::error::{Result, TerminalError};

/// Rebind this process's stdin, stdout and stderr to `slave`.
///
/// After this call anything the process prints, including log output that
/// goes to stderr, shows up in the pty stream.
pub fn redirect_stdio(slave: &File) -> Result<()> {
    let fd = slave.as_raw_fd();
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are open; dup2 atomically replaces target.
        if unsafe { libc::dup2(fd, target) } < 0 {
            return Err(TerminalError::Redirect(io::Error::last_os_error()));
        }
    }
    Ok(())
}

/// Duplicate the current stderr so it survives [`redirect_stdio`].
pub fn duplicate_stderr() -> io::Result<File> {
    // SAFETY: dup on a standard descriptor has no memory-safety preconditions.
    let fd = unsafe { libc::dup(libc::STDERR_FILENO) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd was just returned by dup and is owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_duplicate_stderr_is_writable() {
        let mut err = duplicate_stderr().expect("dup stderr");
        assert!(err.as_raw_fd() > libc::STDERR_FILENO);
        err.write_all(b"").expect("write");
    }
}
