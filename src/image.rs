//! Card image acquisition.
//!
//! Images are read as-is: no resizing, rotation, or re-encoding. The only
//! transformation is base64 encoding into a `data:` URI for the OCR request.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions accepted by [`collect_images`].
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// A business-card photo held in memory.
#[derive(Debug, Clone)]
pub struct CardImage {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl CardImage {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(file_name, bytes)
    }

    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();
        if bytes.is_empty() {
            bail!("Image is empty: {}", file_name);
        }
        let mime_type = sniff_mime(&bytes)
            .or_else(|| mime_from_extension(&file_name))
            .ok_or_else(|| anyhow::anyhow!("Unsupported image type: {}", file_name))?;
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    /// Lowercase hex SHA-256 of the raw bytes.
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some("image/tiff")
    } else {
        None
    }
}

fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let e = e.to_string_lossy().to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// List image files under `dir`, sorted by path.
pub fn collect_images(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn magic_bytes_win_over_extension() {
        let img = CardImage::from_bytes("card.jpg", PNG_HEADER.to_vec()).unwrap();
        assert_eq!(img.mime_type, "image/png");
    }

    #[test]
    fn extension_used_when_magic_unknown() {
        let img = CardImage::from_bytes("card.JPEG", vec![1, 2, 3]).unwrap();
        assert_eq!(img.mime_type, "image/jpeg");
    }

    #[test]
    fn unknown_type_rejected() {
        let err = CardImage::from_bytes("notes.txt", b"hello".to_vec()).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
    }

    #[test]
    fn empty_image_rejected() {
        assert!(CardImage::from_bytes("card.png", Vec::new()).is_err());
    }

    #[test]
    fn data_uri_has_mime_prefix() {
        let img = CardImage::from_bytes("c.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert_eq!(img.data_uri(), "data:image/jpeg;base64,/9j/4A==");
    }

    #[test]
    fn sha256_is_hex() {
        let img = CardImage::from_bytes("c.png", PNG_HEADER.to_vec()).unwrap();
        let digest = img.sha256();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn collect_images_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.png"), PNG_HEADER).unwrap();
        std::fs::write(tmp.path().join("a.JPG"), [0xFF, 0xD8, 0xFF]).unwrap();
        std::fs::write(tmp.path().join("readme.md"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested/c.png"), PNG_HEADER).unwrap();

        let flat = collect_images(tmp.path(), false).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);

        let deep = collect_images(tmp.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }
}
