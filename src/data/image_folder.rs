//! Directory-per-class image corpus
//!
//! Layout: `root/<class>/<image>`. The class name is kept as a label but
//! training ignores it.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use tch::{Kind, Tensor};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File extensions accepted as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// One image file with its class label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Name of the class directory
    pub label: String,
}

/// Image corpus scanned from disk
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root` for class subdirectories holding images
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut class_dirs: Vec<PathBuf> = std::fs::read_dir(&root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        class_dirs.sort();

        let mut classes = Vec::new();
        let mut samples = Vec::new();
        for dir in class_dirs {
            let label = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            files.sort();

            debug!("Class '{}': {} images", label, files.len());
            if files.is_empty() {
                continue;
            }
            classes.push(label.clone());
            samples.extend(files.into_iter().map(|path| ImageSample {
                path,
                label: label.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(Error::DataError(format!(
                "no images found under {}",
                root.display()
            )));
        }

        info!(
            "Found {} images in {} classes under {}",
            samples.len(),
            classes.len(),
            root.display()
        );
        Ok(Self {
            root,
            classes,
            samples,
        })
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the corpus is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Class names in sorted order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// All samples
    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image, resize it to `size`×`size` and return a (3, size, size)
/// float tensor in [0, 1]
pub fn load_image<P: AsRef<Path>>(path: P, size: u32) -> Result<Tensor> {
    let image = image::open(path.as_ref())?
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    // CHW format
    let mut data = Vec::with_capacity((size * size * 3) as usize);
    for c in 0..3 {
        for y in 0..size {
            for x in 0..size {
                data.push(image.get_pixel(x, y).0[c] as f32 / 255.0);
            }
        }
    }

    let s = size as i64;
    Ok(Tensor::from_slice(&data).view([3, s, s]))
}

/// Write a (3, H, W) tensor as an 8-bit RGB image; values are clamped to [0, 1]
pub fn save_image<P: AsRef<Path>>(image: &Tensor, path: P) -> Result<()> {
    let size = image.size();
    if size.len() != 3 || size[0] != 3 {
        return Err(Error::ShapeMismatch {
            context: "save image".to_string(),
            expected: "[3, H, W]".to_string(),
            actual: format!("{:?}", size),
        });
    }
    let (height, width) = (size[1] as u32, size[2] as u32);

    // HWC bytes
    let pixels = (image.detach().to_device(tch::Device::Cpu).clamp(0.0, 1.0) * 255.0)
        .round()
        .permute([1, 2, 0])
        .to_kind(Kind::Uint8)
        .contiguous()
        .flatten(0, -1);
    let data = Vec::<u8>::try_from(&pixels)?;

    let buffer = RgbImage::from_raw(width, height, data).ok_or_else(|| {
        Error::DataError(format!("pixel buffer does not fit {}x{}", width, height))
    })?;
    buffer.save(path.as_ref())?;
    debug!("Wrote {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn write_image(path: &Path, color: [u8; 3]) {
        let image = RgbImage::from_pixel(8, 6, Rgb(color));
        image.save(path).unwrap();
    }

    #[test]
    fn test_scan_classes() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("cats")).unwrap();
        std::fs::create_dir(dir.path().join("dogs")).unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        write_image(&dir.path().join("cats/a.png"), [255, 0, 0]);
        write_image(&dir.path().join("cats/b.png"), [0, 255, 0]);
        write_image(&dir.path().join("dogs/c.png"), [0, 0, 255]);
        std::fs::write(dir.path().join("dogs/notes.txt"), "not an image").unwrap();

        let folder = ImageFolder::scan(dir.path()).unwrap();

        assert_eq!(folder.len(), 3);
        assert_eq!(folder.classes(), &["cats".to_string(), "dogs".to_string()]);
        assert_eq!(folder.samples()[2].label, "dogs");
    }

    #[test]
    fn test_scan_empty_is_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ImageFolder::scan(dir.path()),
            Err(Error::DataError(_))
        ));
    }

    #[test]
    fn test_load_image_resizes_to_chw() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("red.png");
        write_image(&path, [255, 0, 0]);

        let tensor = load_image(&path, 16).unwrap();

        assert_eq!(tensor.size(), vec![3, 16, 16]);
        assert!((tensor.double_value(&[0, 3, 3]) - 1.0).abs() < 0.01);
        assert!(tensor.double_value(&[1, 3, 3]).abs() < 0.01);
    }

    #[test]
    fn test_save_image_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");

        let gray = Tensor::ones([3, 4, 6], (Kind::Float, tch::Device::Cpu)) * 0.5;
        save_image(&(gray * 3.0 - 1.0), &path).unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (6, 4));
        assert_eq!(written.get_pixel(2, 1).0, [128, 128, 128]);

        let flat = Tensor::ones([4, 6], (Kind::Float, tch::Device::Cpu));
        assert!(save_image(&flat, dir.path().join("bad.png")).is_err());
    }
}
