//! Artifact storage for sampled and annotated frames.
//!
//! Stores are flat namespaces of named rasters. Writing an existing name
//! replaces it; there is no versioning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

pub trait ArtifactStore {
    /// Create the namespace if it does not exist yet.
    fn ensure_namespace(&mut self) -> Result<()>;

    /// Persist `image` under `name`. The encoding follows the name's extension.
    fn write_image(&mut self, name: &str, image: &RgbImage) -> Result<()>;

    fn read_image(&self, name: &str) -> Result<RgbImage>;

    fn contains(&self, name: &str) -> bool;
}

/// Artifacts as image files inside one directory.
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ArtifactStore for FilesystemArtifactStore {
    fn ensure_namespace(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create artifact directory {}", self.root.display()))
    }

    fn write_image(&mut self, name: &str, image: &RgbImage) -> Result<()> {
        let path = self.path_for(name);
        image
            .save(&path)
            .with_context(|| format!("write artifact {}", path.display()))
    }

    fn read_image(&self, name: &str) -> Result<RgbImage> {
        let path = self.path_for(name);
        let image =
            image::open(&path).with_context(|| format!("read artifact {}", path.display()))?;
        Ok(image.to_rgb8())
    }

    fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }
}

/// In-memory store for tests and embedding. Rasters are kept losslessly.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    images: BTreeMap<String, RgbImage>,
    reject_prefixes: Vec<String>,
    namespace_ready: bool,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write whose name starts with `prefix`.
    pub fn reject_writes_with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reject_prefixes.push(prefix.into());
        self
    }

    /// Drop a stored artifact, e.g. to simulate external deletion.
    pub fn remove(&mut self, name: &str) -> Option<RgbImage> {
        self.images.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.images.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn namespace_ready(&self) -> bool {
        self.namespace_ready
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn ensure_namespace(&mut self) -> Result<()> {
        self.namespace_ready = true;
        Ok(())
    }

    fn write_image(&mut self, name: &str, image: &RgbImage) -> Result<()> {
        if self.reject_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return Err(anyhow!("write rejected for artifact {}", name));
        }
        self.images.insert(name.to_string(), image.clone());
        Ok(())
    }

    fn read_image(&self, name: &str) -> Result<RgbImage> {
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("artifact {} not found", name))
    }

    fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }
}
