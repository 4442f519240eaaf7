use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

use super::error::{Result, TerminalError};

/// Put a terminal descriptor into raw mode.
///
/// Callers treat failure as non-fatal: the console still works in cooked
/// mode, just with the line discipline doing its own echo.
pub fn make_raw(fd: RawFd) -> Result<()> {
    let mut termios = MaybeUninit::<libc::termios>::uninit();

    // SAFETY: termios is a valid out-pointer for tcgetattr.
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(raw_mode_error(fd));
    }

    // SAFETY: tcgetattr succeeded, so the struct is initialised.
    let mut termios = unsafe { termios.assume_init() };

    // SAFETY: termios is a valid, initialised struct.
    unsafe { libc::cfmakeraw(&mut termios) };

    // SAFETY: fd is a terminal descriptor and termios is initialised.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(raw_mode_error(fd));
    }

    Ok(())
}

fn raw_mode_error(fd: RawFd) -> TerminalError {
    TerminalError::RawMode {
        fd,
        source: io::Error::last_os_error(),
    }
}
