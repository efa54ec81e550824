use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusttype::Font;
use thiserror::Error;

pub type SharedFont = Arc<Font<'static>>;

/// Looked at in order when no font is configured. CJK faces come first so the
/// fallback date label renders.
const SYSTEM_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "C:\\Windows\\Fonts\\msyh.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a usable font")]
    Parse { path: PathBuf },
}

/// Where caption text gets its glyphs from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontSource {
    path: Option<PathBuf>,
}

impl FontSource {
    /// Search the usual system locations.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Loads the font. A configured file must load; without one, the first
    /// system candidate that parses wins, and `None` means text is skipped.
    pub fn resolve(&self) -> Result<Option<SharedFont>, FontError> {
        if let Some(path) = &self.path {
            return load(path).map(Some);
        }

        for candidate in SYSTEM_CANDIDATES {
            let path = Path::new(candidate);

            if !path.exists() {
                continue;
            }

            match load(path) {
                Ok(font) => {
                    log::info!("Loaded caption font: {candidate}");
                    return Ok(Some(font));
                }
                Err(err) => log::error!("Failed to load font candidate: {err}"),
            }
        }

        log::warn!("No caption font found; text overlays will be skipped");
        Ok(None)
    }
}

fn load(path: &Path) -> Result<SharedFont, FontError> {
    let bytes = std::fs::read(path).map_err(|source| FontError::Read {
        path: path.to_owned(),
        source,
    })?;

    Font::try_from_vec(bytes)
        .map(Arc::new)
        .ok_or_else(|| FontError::Parse {
            path: path.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_font_must_exist() {
        let source = FontSource::file("/definitely/not/here.ttf");

        assert!(matches!(source.resolve(), Err(FontError::Read { .. })));
    }

    #[test]
    fn configured_font_must_parse() -> std::io::Result<()> {
        let path = std::env::temp_dir().join(format!("echodraw-bad-font-{}.ttf", std::process::id()));
        std::fs::write(&path, b"definitely not a font")?;

        let result = FontSource::file(&path).resolve();
        std::fs::remove_file(&path)?;

        assert!(matches!(result, Err(FontError::Parse { .. })));
        Ok(())
    }

    #[test]
    fn system_lookup_never_fails() {
        assert!(FontSource::system().resolve().is_ok());
    }
}
