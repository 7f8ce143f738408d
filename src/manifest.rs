use std::path::Path;

use anyhow::Context;

use crate::error::DeepfryResult;

/// Catalog of selectable trait images, one entry per category.
///
/// This is input the engine consumes, never produces; absence or malformed
/// data means "no categories", not an error.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub categories: Vec<ManifestCategory>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestItem {
    pub name: String,
    pub src: String,
}

impl Manifest {
    /// Parse manifest JSON, degrading malformed input to an empty manifest.
    pub fn from_json_lenient(json: &str) -> Self {
        match serde_json::from_str::<Manifest>(json) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(%err, "malformed manifest, using empty category list");
                Manifest::default()
            }
        }
    }

    /// Read a manifest file, degrading a missing or malformed file to empty.
    pub fn from_path_lenient(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_lenient(&json),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "manifest unavailable");
                Manifest::default()
            }
        }
    }

    /// Build a manifest by scanning an assets directory.
    ///
    /// Each immediate subdirectory becomes a category; image files inside it
    /// become items named after their file stem, with `src` relative to
    /// `root`. Categories and items are sorted by name.
    pub fn scan_dir(root: &Path) -> DeepfryResult<Self> {
        let mut categories = Vec::new();

        let mut dirs: Vec<_> = std::fs::read_dir(root)
            .with_context(|| format!("read assets dir '{}'", root.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        dirs.sort();

        for dir in dirs {
            let cat_path = root.join(&dir);
            let mut files: Vec<_> = std::fs::read_dir(&cat_path)
                .with_context(|| format!("read category dir '{}'", cat_path.display()))?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| is_image_file(name))
                .collect();
            files.sort();

            let items = files
                .into_iter()
                .map(|f| {
                    let stem = Path::new(&f)
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| f.clone());
                    ManifestItem {
                        name: stem,
                        src: format!("{dir}/{f}"),
                    }
                })
                .collect();

            categories.push(ManifestCategory { name: dir, items });
        }

        Ok(Manifest { categories })
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> DeepfryResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::DeepfryError::serde(e.to_string()))
    }

    pub fn category(&self, name: &str) -> Option<&ManifestCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn is_image_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["png", "jpg", "jpeg", "gif", "webp"]
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}
