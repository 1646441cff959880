use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

use sketch2portrait::model::{
    architecture::{DiscriminatorConfig, GeneratorConfig, ModelConfig},
    training::TrainingConfig,
};

pub const IMAGE_SIZE: u32 = 32;

pub struct SyntheticData {
    pub sketch_dir: PathBuf,
    pub photo_dir: PathBuf,
}

/// Writes `count` deterministic sketch/portrait pairs under `root`.
pub fn write_pairs(root: &Path, count: u32) -> SyntheticData {
    let sketch_dir = root.join("sketches");
    let photo_dir = root.join("portraits");
    std::fs::create_dir_all(&sketch_dir).unwrap();
    std::fs::create_dir_all(&photo_dir).unwrap();

    for index in 0..count {
        let portrait = RgbImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
            Rgb([
                ((x * 8 + index * 17) % 256) as u8,
                ((y * 8 + index * 31) % 256) as u8,
                ((x + y) * 4 % 256) as u8,
            ])
        });
        let sketch = RgbImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
            let edge = (x + index) % 8 == 0 || (y + index) % 8 == 0;
            let value = if edge { 0 } else { 255 };
            Rgb([value, value, value])
        });
        let name = format!("face_{index:02}.png");
        sketch.save(sketch_dir.join(&name)).unwrap();
        portrait.save(photo_dir.join(&name)).unwrap();
    }

    SyntheticData {
        sketch_dir,
        photo_dir,
    }
}

/// A model small enough to train on the CPU in a test.
pub fn tiny_config() -> TrainingConfig {
    let mut config = TrainingConfig::pix2pix()
        .with_image_size(IMAGE_SIZE as usize)
        .with_batch_size(2)
        .with_num_workers(0)
        .with_num_epochs(3)
        .with_seed(7);
    config.model = ModelConfig::new(
        GeneratorConfig::new().with_base_filters(4).with_depth(5),
        DiscriminatorConfig::new().with_base_filters(4),
    );
    config
}
