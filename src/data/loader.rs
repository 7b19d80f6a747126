//! DataLoader for batching and iterating over real images
//!
//! Provides batching for adversarial training with support for:
//! - Image folders decoded on the fly or in-memory tensors
//! - Random shuffling
//! - Drop last incomplete batch
//! - Skipping unreadable image files

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{Kind, Tensor};
use tracing::warn;

use super::image_folder::{load_image, ImageFolder};
use crate::error::{Error, Result};

enum Source {
    Folder(ImageFolder),
    Memory(Tensor),
}

/// DataLoader yielding batches of shape (batch, 3, size, size) in [0, 1]
pub struct DataLoader {
    source: Source,
    /// Height and width of every image
    image_size: i64,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    /// Current indices for iteration
    indices: Vec<usize>,
    /// Current position in iteration
    current_idx: usize,
    /// Shuffle RNG, seeded from entropy unless [`DataLoader::with_seed`] is used
    rng: StdRng,
}

impl DataLoader {
    /// Create a loader over an image folder
    ///
    /// # Arguments
    ///
    /// * `folder` - Scanned image corpus
    /// * `image_size` - Images are resized to `image_size`×`image_size`
    /// * `batch_size` - Number of images per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop incomplete final batch
    pub fn from_folder(
        folder: ImageFolder,
        image_size: i64,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Result<Self> {
        if image_size <= 0 {
            return Err(Error::InvalidConfiguration(format!(
                "image size must be positive, got {}",
                image_size
            )));
        }
        let len = folder.len();
        Self::build(Source::Folder(folder), len, image_size, batch_size, shuffle, drop_last)
    }

    /// Create a loader over a preloaded (N, 3, S, S) tensor
    pub fn from_tensor(
        images: Tensor,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Result<Self> {
        let size = images.size();
        if size.len() != 4 || size[1] != 3 || size[2] != size[3] {
            return Err(Error::ShapeMismatch {
                context: "in-memory dataset".to_string(),
                expected: "[N, 3, S, S]".to_string(),
                actual: format!("{:?}", size),
            });
        }
        let (len, image_size) = (size[0] as usize, size[2]);
        Self::build(
            Source::Memory(images.to_kind(Kind::Float)),
            len,
            image_size,
            batch_size,
            shuffle,
            drop_last,
        )
    }

    fn build(
        source: Source,
        len: usize,
        image_size: i64,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "batch size must be > 0".to_string(),
            ));
        }

        let mut loader = Self {
            source,
            image_size,
            batch_size,
            shuffle,
            drop_last,
            indices: (0..len).collect(),
            current_idx: 0,
            rng: StdRng::from_entropy(),
        };

        if shuffle {
            loader.shuffle_indices();
        }

        Ok(loader)
    }

    /// Make the shuffle order reproducible
    ///
    /// Restarts the epoch with the sample order reset before reshuffling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.indices.sort_unstable();
        self.reset();
        self
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.num_samples();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            (num_samples + self.batch_size - 1) / self.batch_size
        }
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Height and width of the images
    pub fn image_size(&self) -> i64 {
        self.image_size
    }

    fn shuffle_indices(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch
    ///
    /// Returns None when epoch is complete. Unreadable files are skipped and
    /// replaced by the following samples, so batch sizes stay fixed.
    pub fn next_batch(&mut self) -> Option<Tensor> {
        match &self.source {
            Source::Memory(images) => {
                let num_samples = self.indices.len();
                let start = self.current_idx;
                if start >= num_samples {
                    return None;
                }
                let end = (start + self.batch_size).min(num_samples);
                if self.drop_last && end - start < self.batch_size {
                    return None;
                }

                let idx: Vec<i64> = self.indices[start..end].iter().map(|&i| i as i64).collect();
                self.current_idx = end;
                let idx = Tensor::from_slice(&idx).to_device(images.device());
                Some(images.index_select(0, &idx))
            }
            Source::Folder(folder) => {
                let mut batch = Vec::with_capacity(self.batch_size);
                while batch.len() < self.batch_size && self.current_idx < self.indices.len() {
                    let sample = &folder.samples()[self.indices[self.current_idx]];
                    self.current_idx += 1;
                    match load_image(&sample.path, self.image_size as u32) {
                        Ok(image) => batch.push(image),
                        Err(e) => warn!("Skipping {}: {}", sample.path.display(), e),
                    }
                }

                if batch.is_empty() || (self.drop_last && batch.len() < self.batch_size) {
                    return None;
                }
                Some(Tensor::stack(&batch, 0))
            }
        }
    }

    /// Iterate over all batches of a fresh epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = Tensor;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tch::Device;
    use tempfile::tempdir;

    fn images(n: i64) -> Tensor {
        Tensor::rand([n, 3, 8, 8], (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_dataloader_basic() {
        let mut loader = DataLoader::from_tensor(images(10), 3, false, false).unwrap();

        assert_eq!(loader.num_batches(), 4); // ceil(10/3) = 4
        assert_eq!(loader.num_samples(), 10);

        let mut batch_count = 0;
        while let Some(batch) = loader.next_batch() {
            batch_count += 1;
            if batch_count < 4 {
                assert_eq!(batch.size(), vec![3, 3, 8, 8]);
            } else {
                assert_eq!(batch.size()[0], 1);
            }
        }
        assert_eq!(batch_count, 4);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let mut loader = DataLoader::from_tensor(images(10), 3, true, true).unwrap();

        assert_eq!(loader.num_batches(), 3); // floor(10/3) = 3

        let batches: Vec<_> = loader.iter().collect();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.size()[0] == 3));

        // A second epoch yields the same number of batches.
        assert_eq!(loader.iter().count(), 3);
    }

    #[test]
    fn test_rejects_bad_input() {
        let flat = Tensor::rand([10, 8], (Kind::Float, Device::Cpu));
        assert!(DataLoader::from_tensor(flat, 2, false, false).is_err());
        assert!(DataLoader::from_tensor(images(4), 0, false, false).is_err());
    }

    #[test]
    fn test_folder_loader_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        let class_dir = dir.path().join("class_a");
        std::fs::create_dir(&class_dir).unwrap();
        for i in 0..3 {
            RgbImage::from_pixel(20, 20, Rgb([10, 20, 30]))
                .save(class_dir.join(format!("img_{}.png", i)))
                .unwrap();
        }
        std::fs::write(class_dir.join("broken.png"), b"not a png").unwrap();

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.len(), 4);

        let mut loader = DataLoader::from_folder(folder, 16, 2, false, false).unwrap();
        let batches: Vec<_> = loader.iter().collect();

        let total: i64 = batches.iter().map(|b| b.size()[0]).sum();
        assert_eq!(total, 3);
        assert_eq!(batches[0].size(), vec![2, 3, 16, 16]);
        assert!(batches[0].max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let ids = Tensor::arange(20, (Kind::Float, Device::Cpu))
            .view([20, 1, 1, 1])
            .expand([20, 3, 2, 2], false)
            .contiguous();
        let order = |seed: u64| -> Vec<Vec<f64>> {
            let mut loader = DataLoader::from_tensor(ids.shallow_clone(), 5, true, false)
                .unwrap()
                .with_seed(seed);
            (0..2)
                .flat_map(|_| loader.iter().collect::<Vec<_>>())
                .map(|b| {
                    let firsts = b.select(1, 0).select(1, 0).select(1, 0);
                    Vec::<f64>::try_from(&firsts.to_kind(Kind::Double).contiguous()).unwrap()
                })
                .collect()
        };

        let first = order(7);
        assert_eq!(first, order(7));
        assert_ne!(first, order(8));

        let mut seen: Vec<f64> = first[..4].concat();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..20).map(f64::from).collect::<Vec<_>>());
    }
}
