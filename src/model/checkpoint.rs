use burn::{prelude::*, record::CompactRecorder};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::architecture::{Discriminator, Generator, ModelConfig};

pub const GENERATOR_FILE: &str = "best_generator";
pub const DISCRIMINATOR_FILE: &str = "best_discriminator";
pub const CONFIG_FILE: &str = "config.json";
/// Extension appended by [`CompactRecorder`].
const RECORD_EXTENSION: &str = "mpk";

/// Location of the best-so-far model snapshots.
#[derive(Debug, Clone)]
pub struct Checkpoints {
    dir: PathBuf,
}

impl Checkpoints {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn create_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Path of the generator snapshot as written to disk, extension included.
    pub fn generator_path(&self) -> PathBuf {
        self.record_path(GENERATOR_FILE)
    }

    pub fn discriminator_path(&self) -> PathBuf {
        self.record_path(DISCRIMINATOR_FILE)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(name).with_extension(RECORD_EXTENSION)
    }

    /// Overwrites both snapshots in place.
    pub fn save<B: Backend>(
        &self,
        generator: &Generator<B>,
        discriminator: &Discriminator<B>,
    ) -> Result<()> {
        let recorder = CompactRecorder::new();
        generator
            .clone()
            .save_file(self.dir.join(GENERATOR_FILE), &recorder)?;
        discriminator
            .clone()
            .save_file(self.dir.join(DISCRIMINATOR_FILE), &recorder)?;
        Ok(())
    }

    pub fn load_generator<B: Backend>(
        &self,
        config: &ModelConfig,
        device: &B::Device,
    ) -> Result<Generator<B>> {
        let generator = config
            .init_generator(device)
            .load_file(self.dir.join(GENERATOR_FILE), &CompactRecorder::new(), device)?;
        Ok(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::architecture::{DiscriminatorConfig, GeneratorConfig};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn tiny_config() -> ModelConfig {
        ModelConfig::new(
            GeneratorConfig::new().with_base_filters(2).with_depth(3),
            DiscriminatorConfig::new().with_base_filters(2).with_n_layers(1),
        )
    }

    #[test]
    fn saved_generator_reloads_with_same_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = Checkpoints::new(dir.path().join("saved_models"));
        checkpoints.create_dir().unwrap();

        let device = Default::default();
        let config = tiny_config();
        let generator = config.init_generator::<TestBackend>(&device);
        let discriminator = config.init_discriminator::<TestBackend>(&device);
        checkpoints.save(&generator, &discriminator).unwrap();

        assert!(checkpoints.generator_path().is_file());
        assert!(checkpoints.discriminator_path().is_file());

        let input =
            Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device);
        let reloaded = checkpoints
            .load_generator::<TestBackend>(&config, &device)
            .unwrap();

        // Snapshots are stored in half precision.
        let before: Vec<f32> = generator.forward(input.clone()).into_data().to_vec().unwrap();
        let after: Vec<f32> = reloaded.forward(input).into_data().to_vec().unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn loading_missing_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = Checkpoints::new(dir.path());
        let device = Default::default();

        let result = checkpoints.load_generator::<TestBackend>(&tiny_config(), &device);

        assert!(result.is_err());
    }
}
