use burn::{data::dataset::Dataset, prelude::*};
use image::RgbImage;
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{
    checkpoint::Checkpoints,
    data::{PairBatcher, PairDataset},
    training::{TrainingConfig, data_loader, mean_l1},
};
use crate::utils::{CHANNELS, chw_to_rgb, hstack};

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub test_loss: f64,
    pub test_pairs: usize,
    pub samples: Vec<PathBuf>,
}

/// Splits a `[batch, 3, H, W]` tensor into one RGB image per batch entry.
pub fn tensor_to_images<B: Backend>(tensor: Tensor<B, 4>) -> Vec<RgbImage> {
    let [_, _, height, width] = tensor.dims();
    let data = match tensor.into_data().convert::<f32>().to_vec::<f32>() {
        Ok(data) => data,
        Err(err) => {
            warn!("Failed to read image tensor: {err:?}");
            return Vec::new();
        }
    };
    data.chunks(CHANNELS * height * width)
        .filter_map(|chunk| chw_to_rgb(chunk, height, width))
        .collect()
}

/// Scores the best saved generator on the test split.
///
/// With `sample_dir`, the first test batch is also written out as
/// `sketch | generated | portrait` strips.
pub fn evaluate<B: Backend>(
    sketch_dir: &Path,
    photo_dir: &Path,
    artifact_dir: &Path,
    config: &TrainingConfig,
    sample_dir: Option<&Path>,
    device: B::Device,
) -> Result<Evaluation> {
    config.validate()?;
    let checkpoints = Checkpoints::new(artifact_dir);
    let generator = checkpoints.load_generator::<B>(&config.model, &device)?;

    let splits = PairDataset::splits(
        sketch_dir,
        photo_dir,
        config.image_size,
        config.valid_ratio,
        config.test_ratio,
        config.seed,
    )?;
    let test_pairs = splits.test.len();
    let dataloader_test = data_loader::<B>(
        PairBatcher::new(config.image_size),
        config,
        &device,
        false,
        splits.test,
    );

    let test_loss = mean_l1(&generator, &dataloader_test);
    info!("Test Loss: {test_loss:.4} over {test_pairs} pairs");

    let mut samples = Vec::new();
    if let Some(dir) = sample_dir {
        std::fs::create_dir_all(dir)?;
        if let Some(batch) = dataloader_test.iter().next() {
            let fakes = tensor_to_images(generator.forward(batch.sketches.clone()));
            let sketches = tensor_to_images(batch.sketches);
            let portraits = tensor_to_images(batch.portraits);

            let triples = sketches.into_iter().zip(fakes).zip(portraits);
            for (index, ((sketch, fake), portrait)) in triples.enumerate() {
                let Some(strip) = hstack(&[sketch, fake, portrait]) else {
                    continue;
                };
                let path = dir.join(format!("sample_{index:03}.png"));
                strip.save(&path).map_err(|source| Error::Image {
                    path: path.clone(),
                    source,
                })?;
                samples.push(path);
            }
        }
        info!("Wrote {} samples to {}", samples.len(), dir.display());
    }

    Ok(Evaluation {
        test_loss,
        test_pairs,
        samples,
    })
}
