//! Serial tty links.
//!
//! The device talks over a USB CDC or UART tty. The port is put into raw mode
//! (no echo, no line discipline, no CR/LF translation) so the line codec sees
//! the bytes exactly as the device sent them.

use crate::error::{constants, BridgeError, Result};
use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use tracing::debug;

/// Baud rates accepted for serial endpoints
pub const SUPPORTED_BAUD_RATES: [u32; 8] =
    [9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600];

/// Map a numeric link speed onto a termios constant.
pub fn baud_rate(speed: u32) -> Result<BaudRate> {
    let rate = match speed {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460_800 => BaudRate::B460800,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        921_600 => BaudRate::B921600,
        other => {
            return Err(BridgeError::ConfigError(format!(
                "{}: {other} (supported: {SUPPORTED_BAUD_RATES:?})",
                constants::ERR_UNSUPPORTED_BAUD
            )))
        }
    };
    Ok(rate)
}

/// Open `path` read-write, configure raw mode at `speed`, and hand it to tokio.
pub fn open(path: &Path, speed: u32) -> Result<tokio::fs::File> {
    let rate = baud_rate(speed)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(nix::libc::O_NOCTTY)
        .open(path)
        .map_err(|e| {
            BridgeError::TransportError(format!("failed to open {}: {e}", path.display()))
        })?;

    let fd = file.as_raw_fd();
    let mut settings = termios::tcgetattr(fd).map_err(|e| termios_error(path, e))?;
    termios::cfmakeraw(&mut settings);
    settings.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    termios::cfsetspeed(&mut settings, rate).map_err(|e| termios_error(path, e))?;
    termios::tcsetattr(fd, SetArg::TCSANOW, &settings).map_err(|e| termios_error(path, e))?;

    debug!(path = %path.display(), speed, "Serial port configured");
    Ok(tokio::fs::File::from_std(file))
}

fn termios_error(path: &Path, error: nix::Error) -> BridgeError {
    BridgeError::TransportError(format!(
        "failed to configure {} as a serial port: {error}",
        path.display()
    ))
}
