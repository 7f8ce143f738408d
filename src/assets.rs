use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::error::{DeepfryError, DeepfryResult};

pub mod decode;

/// Decoded raster image ready for compositing.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl PreparedImage {
    /// Build from raw premultiplied RGBA8 bytes.
    pub fn from_rgba8_premul(width: u32, height: u32, data: Vec<u8>) -> DeepfryResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| DeepfryError::validation("image buffer size overflows"))?;
        if data.len() != expected {
            return Err(DeepfryError::validation(
                "image data length must be width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(data),
        })
    }
}

/// Byte source for category assets, keyed by the manifest's source reference.
///
/// The engine never touches IO itself; callers hand a fetcher to
/// [`Engine::pump_assets`](crate::engine::Engine::pump_assets) the same way a
/// render call receives its asset cache.
pub trait AssetFetcher {
    fn fetch(&mut self, source: &str) -> DeepfryResult<Vec<u8>>;
}

/// Filesystem-backed fetcher rooted at an assets directory.
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for FsFetcher {
    fn fetch(&mut self, source: &str) -> DeepfryResult<Vec<u8>> {
        let rel = normalize_source_path(source)?;
        let path = self.root.join(rel);
        let bytes =
            std::fs::read(&path).with_context(|| format!("read asset '{}'", path.display()))?;
        Ok(bytes)
    }
}

/// Normalize and validate a root-relative source reference.
///
/// The normalized result uses `/` separators and removes `.` segments;
/// absolute paths and parent traversals (`..`) are rejected.
pub fn normalize_source_path(source: &str) -> DeepfryResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(DeepfryError::validation("asset sources must be relative"));
    }
    if s.is_empty() {
        return Err(DeepfryError::validation("asset source must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(DeepfryError::validation(
                "asset sources must not contain '..'",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(DeepfryError::validation(
            "asset source must contain a file name",
        ));
    }

    Ok(out.join("/"))
}
