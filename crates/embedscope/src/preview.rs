//! Best-effort preview of the saved figure.
//!
//! Hands the image to the platform's default viewer. Nothing here can fail
//! the run; problems are logged at debug level.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

/// Open `path` in the system image viewer if one is reachable.
pub fn open(path: &Path) {
    let Some(mut cmd) = viewer_command(path, |key| std::env::var_os(key)) else {
        debug!("No display available, skipping preview");
        return;
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match cmd.spawn() {
        Ok(_) => debug!("Opened preview of {}", path.display()),
        Err(e) => debug!("Could not open preview: {}", e),
    }
}

/// Build the viewer command for this platform.
///
/// On Linux and the BSDs a viewer only makes sense under X11 or Wayland.
fn viewer_command(path: &Path, env: impl Fn(&str) -> Option<OsString>) -> Option<Command> {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        Some(cmd)
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        Some(cmd)
    } else if has_display(env) {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        Some(cmd)
    } else {
        None
    }
}

fn has_display(env: impl Fn(&str) -> Option<OsString>) -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|key| env(key).is_some_and(|v| !v.is_empty()))
}
