use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use log::{debug, warn};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::collections::{BTreeMap, btree_map::Entry};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::{CHANNELS, load_square_rgb, rgb_to_chw};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

/// A sketch and the portrait it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub sketch: PathBuf,
    pub portrait: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PairItem {
    pub sketch: Vec<f32>,
    pub portrait: Vec<f32>,
}

pub struct PairDataset {
    pairs: Vec<ImagePair>,
    image_size: usize,
}

/// Disjoint train/validation/test partitions of the available pairs.
pub struct DatasetSplits {
    pub train: PairDataset,
    pub valid: PairDataset,
    pub test: PairDataset,
}

fn image_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let read_err = |source| Error::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned);
        let (true, Some(stem)) = (is_image, stem) else {
            continue;
        };
        // Directory order is unspecified; the lexicographically first file wins.
        match files.entry(stem) {
            Entry::Vacant(slot) => {
                slot.insert(path);
            }
            Entry::Occupied(mut slot) => {
                let ignored = if path < *slot.get() {
                    slot.insert(path)
                } else {
                    path
                };
                warn!(
                    "Duplicate image stem: using {}, ignoring {}",
                    slot.get().display(),
                    ignored.display()
                );
            }
        }
    }
    Ok(files)
}

/// Matches sketches to portraits by file stem, sorted by stem.
pub fn pair_images<P: AsRef<Path>, Q: AsRef<Path>>(
    sketch_dir: P,
    photo_dir: Q,
) -> Result<Vec<ImagePair>> {
    let sketch_dir = sketch_dir.as_ref();
    let photo_dir = photo_dir.as_ref();
    let mut portraits = image_files(photo_dir)?;

    let mut pairs = Vec::new();
    for (stem, sketch) in image_files(sketch_dir)? {
        match portraits.remove(&stem) {
            Some(portrait) => pairs.push(ImagePair { sketch, portrait }),
            None => warn!("No portrait matches sketch {}, skipping", sketch.display()),
        }
    }

    if pairs.is_empty() {
        return Err(Error::NoPairs {
            sketch_dir: sketch_dir.to_path_buf(),
            photo_dir: photo_dir.to_path_buf(),
        });
    }
    Ok(pairs)
}

fn split_len(total: usize, ratio: f64) -> usize {
    ((total as f64 * ratio).round() as usize).max(1)
}

/// Shuffles `pairs` with `seed` and cuts off validation and test partitions.
///
/// Each partition receives at least one pair; the train split gets whatever remains
/// and must not end up empty.
pub fn split_pairs(
    mut pairs: Vec<ImagePair>,
    valid_ratio: f64,
    test_ratio: f64,
    seed: u64,
) -> Result<(Vec<ImagePair>, Vec<ImagePair>, Vec<ImagePair>)> {
    let total = pairs.len();
    let valid_len = split_len(total, valid_ratio);
    let test_len = split_len(total, test_ratio);
    if valid_len + test_len >= total {
        return Err(Error::TooFewPairs(total));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);

    let test = pairs.split_off(total - test_len);
    let valid = pairs.split_off(total - test_len - valid_len);
    Ok((pairs, valid, test))
}

impl PairDataset {
    pub fn new(pairs: Vec<ImagePair>, image_size: usize) -> Self {
        Self { pairs, image_size }
    }

    /// Pairs both directories and builds the three splits.
    pub fn splits<P: AsRef<Path>, Q: AsRef<Path>>(
        sketch_dir: P,
        photo_dir: Q,
        image_size: usize,
        valid_ratio: f64,
        test_ratio: f64,
        seed: u64,
    ) -> Result<DatasetSplits> {
        let pairs = pair_images(sketch_dir, photo_dir)?;
        let (train, valid, test) = split_pairs(pairs, valid_ratio, test_ratio, seed)?;
        debug!(
            "Split pairs: {} train, {} validation, {} test",
            train.len(),
            valid.len(),
            test.len()
        );
        Ok(DatasetSplits {
            train: Self::new(train, image_size),
            valid: Self::new(valid, image_size),
            test: Self::new(test, image_size),
        })
    }

    fn load(&self, path: &Path) -> Option<Vec<f32>> {
        match load_square_rgb(path, self.image_size as u32) {
            Ok(image) => Some(rgb_to_chw(&image)),
            Err(err) => {
                warn!("Failed to load image {}: {}", path.display(), err);
                None
            }
        }
    }
}

impl Dataset<PairItem> for PairDataset {
    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn get(&self, index: usize) -> Option<PairItem> {
        let pair = self.pairs.get(index)?;
        Some(PairItem {
            sketch: self.load(&pair.sketch)?,
            portrait: self.load(&pair.portrait)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PairBatcher {
    image_size: usize,
}

impl PairBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

#[derive(Clone, Debug)]
pub struct PairBatch<B: Backend> {
    pub sketches: Tensor<B, 4>,  // Shape: [batch_size, channels, height, width]
    pub portraits: Tensor<B, 4>, // Same shape as sketches
}

impl<B: Backend> Batcher<B, PairItem, PairBatch<B>> for PairBatcher {
    fn batch(&self, items: Vec<PairItem>, device: &B::Device) -> PairBatch<B> {
        let shape = [1, CHANNELS, self.image_size, self.image_size];
        let to_tensor = |data: Vec<f32>| {
            Tensor::<B, 4>::from_data(
                TensorData::new(data, shape).convert::<B::FloatElem>(),
                device,
            )
        };

        let (sketches, portraits): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (to_tensor(item.sketch), to_tensor(item.portrait)))
            .unzip();

        PairBatch {
            sketches: Tensor::cat(sketches, 0),
            portraits: Tensor::cat(portraits, 0),
        }
    }
}
