use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

/// Failure while reading or decoding a file below the asset root.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Directory that shader sources and textures are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRoot {
    root: PathBuf,
}

impl AssetRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Joins a path such as `shader/lamp.vert.wgsl` onto the root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn read_bytes(&self, relative: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(relative);
        debug!("reading {}", path.display());
        fs::read(&path).map_err(|source| AssetError::Read { path, source })
    }

    pub fn read_text(&self, relative: &str) -> Result<String, AssetError> {
        let path = self.resolve(relative);
        debug!("reading {}", path.display());
        fs::read_to_string(&path).map_err(|source| AssetError::Read { path, source })
    }

    /// Reads and decodes an image into tightly packed RGBA8 rows.
    pub fn load_image(&self, relative: &str) -> Result<ImageData, AssetError> {
        let bytes = self.read_bytes(relative)?;
        let decoded = image::load_from_memory(&bytes).map_err(|source| AssetError::Decode {
            path: self.resolve(relative),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(ImageData {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

impl Default for AssetRoot {
    fn default() -> Self {
        Self::new("assets")
    }
}

/// Decoded texture pixels, four bytes per texel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// A single opaque texel, used for texture units nothing was bound to.
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: color.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_text_relative_to_root() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("shader")).unwrap();
        fs::write(dir.path().join("shader/a.wgsl"), "// hello").unwrap();

        let assets = AssetRoot::new(dir.path());
        assert_eq!(assets.read_text("shader/a.wgsl").unwrap(), "// hello");
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempdir().unwrap();
        let assets = AssetRoot::new(dir.path());
        let err = assets.read_text("shader/missing.wgsl").unwrap_err();
        assert!(matches!(err, AssetError::Read { .. }));
        assert!(err.to_string().contains("missing.wgsl"));
    }

    #[test]
    fn decodes_png_to_rgba() {
        let dir = tempdir().unwrap();
        let mut img = image::RgbImage::new(3, 2);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.save(dir.path().join("red.png")).unwrap();

        let data = AssetRoot::new(dir.path()).load_image("red.png").unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.pixels.len(), 3 * 2 * 4);
        assert_eq!(&data.pixels[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
        let err = AssetRoot::new(dir.path()).load_image("bad.png").unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }
}
