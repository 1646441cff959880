use crate::error;
use crate::model::{
    architecture::{
        Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, ModelConfig,
    },
    checkpoint::Checkpoints,
    data::{PairBatch, PairBatcher, PairDataset},
    early_stopping::{EarlyStopping, Verdict},
    loss::{discriminator_loss, generator_loss, l1_loss, stop_gradient},
};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{ElementConversion, backend::AutodiffBackend},
};
use log::info;
use std::path::Path;
use std::sync::Arc;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer_g: AdamConfig,
    pub optimizer_d: AdamConfig,

    #[config(default = 50)]
    pub num_epochs: usize,

    #[config(default = 16)]
    pub batch_size: usize,

    /// Loader threads; 0 loads batches on the training thread.
    #[config(default = 4)]
    pub num_workers: usize,

    #[config(default = 42)]
    pub seed: u64,

    #[config(default = 2e-4)]
    pub learning_rate: f64,

    #[config(default = 100.0)]
    pub l1_weight: f64,

    #[config(default = 10)]
    pub patience: usize,

    #[config(default = 256)]
    pub image_size: usize,

    #[config(default = 0.1)]
    pub valid_ratio: f64,

    #[config(default = 0.1)]
    pub test_ratio: f64,
}

impl TrainingConfig {
    /// Full-size U-Net and PatchGAN with Adam (beta1 0.5, beta2 0.999) on both networks.
    pub fn pix2pix() -> Self {
        let adam = AdamConfig::new().with_beta_1(0.5).with_beta_2(0.999);
        Self::new(
            ModelConfig::new(GeneratorConfig::new(), DiscriminatorConfig::new()),
            adam.clone(),
            adam,
        )
    }

    /// Rejects image sizes the networks cannot process.
    ///
    /// Every generator level halves the image and the decoder has to land back on
    /// the encoder's shapes, so `image_size` must be a multiple of `2^depth`. The
    /// discriminator needs at least 3 pixels left after its strided layers.
    pub fn validate(&self) -> error::Result<()> {
        let generator = &self.model.generator;
        let discriminator = &self.model.discriminator;
        if generator.depth < 2 {
            return Err(error::Error::InvalidConfig(format!(
                "generator depth {} is below 2",
                generator.depth
            )));
        }
        if discriminator.n_layers < 1 {
            return Err(error::Error::InvalidConfig(
                "discriminator needs at least one layer".to_string(),
            ));
        }

        let levels = u32::try_from(generator.depth)
            .ok()
            .and_then(|depth| 1usize.checked_shl(depth))
            .filter(|levels| self.image_size >= *levels && self.image_size % levels == 0);
        if levels.is_none() {
            return Err(error::Error::InvalidConfig(format!(
                "image size {} is not a positive multiple of 2^{} required by generator depth {}",
                self.image_size, generator.depth, generator.depth
            )));
        }

        let patch_size = u32::try_from(discriminator.n_layers)
            .ok()
            .and_then(|layers| self.image_size.checked_shr(layers))
            .unwrap_or(0);
        if patch_size < 3 {
            return Err(error::Error::InvalidConfig(format!(
                "image size {} is too small for {} discriminator layers",
                self.image_size, discriminator.n_layers
            )));
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> error::Result<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|err| error::Error::Config {
            path: path.to_path_buf(),
            reason: format!("{err:?}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchLosses {
    pub discriminator: f64,
    pub generator: f64,
    pub adversarial: f64,
    pub l1: f64,
}

#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    pub batches: Vec<BatchLosses>,
    pub val_loss: f64,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochReport>,
    pub best_val_loss: f64,
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl TrainingSummary {
    /// Validation losses of the epochs that wrote a checkpoint, in order.
    pub fn checkpointed_losses(&self) -> Vec<f64> {
        self.epochs
            .iter()
            .filter(|report| report.verdict == Verdict::Improved)
            .map(|report| report.val_loss)
            .collect()
    }
}

pub fn data_loader<B: Backend>(
    batcher: PairBatcher,
    config: &TrainingConfig,
    device: &B::Device,
    shuffle: bool,
    dataset: PairDataset,
) -> Arc<dyn DataLoader<B, PairBatch<B>>> {
    let mut builder = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .set_device(device.clone());
    if shuffle {
        builder = builder.shuffle(config.seed);
    }
    if config.num_workers > 0 {
        builder = builder.num_workers(config.num_workers);
    }
    builder.build(dataset)
}

/// One discriminator update followed by one generator update on the same batch.
///
/// The generator runs forward once; the discriminator step sees the output through
/// [`stop_gradient`], the generator step backpropagates through the same tensor.
pub fn train_step<B, OG, OD>(
    generator: Generator<B>,
    discriminator: Discriminator<B>,
    optim_g: &mut OG,
    optim_d: &mut OD,
    batch: PairBatch<B>,
    config: &TrainingConfig,
) -> (Generator<B>, Discriminator<B>, BatchLosses)
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    let PairBatch {
        sketches,
        portraits,
    } = batch;

    let fake = generator.forward(sketches.clone());

    // --- 1. Train the Discriminator --- //
    let loss_d = discriminator_loss(
        &discriminator,
        sketches.clone(),
        portraits.clone(),
        stop_gradient(fake.clone()),
    );
    let grads_d = GradientsParams::from_grads(loss_d.total.backward(), &discriminator);
    let discriminator = optim_d.step(config.learning_rate, discriminator, grads_d);

    // --- 2. Train the Generator --- //
    let loss_g = generator_loss(
        &discriminator,
        sketches,
        portraits,
        fake,
        config.l1_weight,
    );
    let grads_g = GradientsParams::from_grads(loss_g.total.backward(), &generator);
    let generator = optim_g.step(config.learning_rate, generator, grads_g);

    let losses = BatchLosses {
        discriminator: loss_d.total.into_scalar().elem::<f64>(),
        generator: loss_g.total.into_scalar().elem::<f64>(),
        adversarial: loss_g.adversarial.into_scalar().elem::<f64>(),
        l1: loss_g.l1.into_scalar().elem::<f64>(),
    };
    (generator, discriminator, losses)
}

/// Mean over batches of each batch's mean L1 error. NaN when the loader is empty.
pub fn mean_l1<B: Backend>(
    generator: &Generator<B>,
    dataloader: &Arc<dyn DataLoader<B, PairBatch<B>>>,
) -> f64 {
    let mut total = 0.0;
    let mut batches = 0usize;
    for batch in dataloader.iter() {
        let fake = generator.forward(batch.sketches);
        total += l1_loss(fake, batch.portraits).into_scalar().elem::<f64>();
        batches += 1;
    }
    total / batches as f64
}

pub fn train<B: AutodiffBackend>(
    sketch_dir: &Path,
    photo_dir: &Path,
    artifact_dir: &Path,
    config: &TrainingConfig,
    device: B::Device,
) -> error::Result<TrainingSummary> {
    config.validate()?;
    let checkpoints = Checkpoints::new(artifact_dir);
    checkpoints.create_dir()?;
    config.save(checkpoints.config_path())?;

    B::seed(config.seed);

    let splits = PairDataset::splits(
        sketch_dir,
        photo_dir,
        config.image_size,
        config.valid_ratio,
        config.test_ratio,
        config.seed,
    )?;
    info!(
        "Loaded {} training, {} validation and {} test pairs",
        splits.train.len(),
        splits.valid.len(),
        splits.test.len()
    );

    let batcher = PairBatcher::new(config.image_size);
    let dataloader_train = data_loader::<B>(batcher.clone(), config, &device, true, splits.train);
    let dataloader_valid =
        data_loader::<B::InnerBackend>(batcher, config, &device, false, splits.valid);
    let num_batches = dataloader_train.num_items().div_ceil(config.batch_size);

    let mut generator = config.model.init_generator::<B>(&device);
    let mut discriminator = config.model.init_discriminator::<B>(&device);
    let mut optim_g = config.optimizer_g.init();
    let mut optim_d = config.optimizer_d.init();

    let mut early_stopping = EarlyStopping::new(config.patience);
    let mut epochs = Vec::new();
    let mut stopped_early = false;

    for epoch in 0..config.num_epochs {
        let mut batches = Vec::with_capacity(num_batches);
        for (iteration, batch) in dataloader_train.iter().enumerate() {
            let (next_generator, next_discriminator, losses) = train_step(
                generator,
                discriminator,
                &mut optim_g,
                &mut optim_d,
                batch,
                config,
            );
            generator = next_generator;
            discriminator = next_discriminator;

            info!(
                "[Epoch {}/{}] [Batch {}/{}] [D loss: {:.4}] [G loss: {:.4}]",
                epoch,
                config.num_epochs,
                iteration,
                num_batches,
                losses.discriminator,
                losses.generator,
            );
            batches.push(losses);
        }

        let val_loss = mean_l1(&generator.valid(), &dataloader_valid);
        info!("Validation Loss: {val_loss:.4}");

        let verdict = early_stopping.observe(epoch, val_loss);
        match verdict {
            Verdict::Improved => {
                checkpoints.save(&generator, &discriminator)?;
                info!("Model saved at epoch {epoch} with validation loss: {val_loss:.4}");
            }
            Verdict::Stalled { stalled_epochs } => info!(
                "No improvement for {stalled_epochs}/{} epochs",
                early_stopping.patience()
            ),
            Verdict::Stop => info!("Early stopping triggered at epoch {epoch}"),
        }

        epochs.push(EpochReport {
            epoch,
            batches,
            val_loss,
            verdict,
        });
        if verdict == Verdict::Stop {
            stopped_early = true;
            break;
        }
    }

    Ok(TrainingSummary {
        epochs,
        best_val_loss: early_stopping.best_loss(),
        best_epoch: early_stopping.best_epoch(),
        stopped_early,
    })
}
