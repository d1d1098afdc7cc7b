//! Font registration for plot text.
//!
//! Plot text is rasterised from a TrueType file registered with plotters
//! under [`FONT_FAMILY`]. Registration happens once per process.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use plotters::style::{FontStyle, register_font};

/// Family name every text element is drawn with.
pub const FONT_FAMILY: &str = "sans-serif";

/// Well-known locations of a plain sans-serif face.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static REGISTERED: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Register a font for [`FONT_FAMILY`] if none is registered yet.
///
/// `preferred` is tried before the system locations. Only the first call's
/// preference counts. Returns the registered file, or `None` when no usable
/// font exists, in which case callers must not draw text.
pub fn ensure_registered(preferred: Option<&Path>) -> Option<&'static Path> {
    REGISTERED
        .get_or_init(|| register_first(preferred))
        .as_deref()
}

fn register_first(preferred: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = preferred {
        if try_register(path) {
            return Some(path.to_path_buf());
        }
        tracing::warn!(
            "Configured font {} is unusable, searching system fonts",
            path.display()
        );
    }

    SYSTEM_FONTS
        .iter()
        .map(Path::new)
        .find(|path| try_register(path))
        .map(Path::to_path_buf)
}

fn try_register(path: &Path) -> bool {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::trace!("Skipping font {}: {}", path.display(), e);
            return false;
        }
    };

    // plotters keeps a 'static reference to the face for the process lifetime.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    let ok = register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok();
    if ok {
        tracing::debug!("Registered font {}", path.display());
    } else {
        tracing::debug!("Not a usable font: {}", path.display());
    }
    ok
}
