//! Data module for loading real images and building synthetic clips
//!
//! This module provides:
//! - Directory-per-class image corpus scanning and decoding
//! - DataLoader for batching images
//! - Synthetic video frames from a single image

mod image_folder;
mod loader;
mod video;

pub use image_folder::{load_image, save_image, ImageFolder, ImageSample, IMAGE_EXTENSIONS};
pub use loader::{DataLoader, DataLoaderIter};
pub use video::{SyntheticVideo, SyntheticVideoConfig};
