use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, LeakyRelu,
        LeakyReluConfig, PaddingConfig2d, Relu, Tanh,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    },
    prelude::*,
};

/// Weights are drawn from N(0, 0.02) as in the pix2pix reference setup.
const WEIGHT_INIT: Initializer = Initializer::Normal {
    mean: 0.0,
    std: 0.02,
};

/// Channel width at a given depth: doubles per level, capped at 8x the base.
fn level_channels(base_filters: usize, level: usize) -> usize {
    base_filters * (1 << level.min(3))
}

/// U-Net generator: sketch in, portrait out, both `[batch, C, H, W]` in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    downs: Vec<DownBlock<B>>,
    ups: Vec<UpBlock<B>>,
    output: Tanh,
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 3)]
    pub out_channels: usize,
    #[config(default = 64)]
    pub base_filters: usize,
    /// Number of stride-2 downsampling levels. 8 levels take 256x256 to 1x1.
    #[config(default = 8)]
    pub depth: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
    /// Innermost decoder blocks that apply dropout.
    #[config(default = 3)]
    pub dropout_layers: usize,
    #[config(default = 0.2)]
    pub leaky_relu_slope: f64,
    /// Weight of each batch in the running statistics used for inference.
    #[config(default = 0.1)]
    pub batch_norm_momentum: f64,
}

#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    activation: Option<LeakyRelu>,
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
}

#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    activation: Relu,
    deconv: ConvTranspose2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    dropout: Option<Dropout>,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        assert!(self.depth >= 2, "generator depth must be at least 2");
        let channels = |level| level_channels(self.base_filters, level);
        let batch_norm = |width: usize| -> BatchNorm<B, 2> {
            BatchNormConfig::new(width)
                .with_momentum(self.batch_norm_momentum)
                .init(device)
        };
        let innermost = self.depth - 1;

        let downs = (0..self.depth)
            .map(|level| {
                let in_channels = if level == 0 {
                    self.in_channels
                } else {
                    channels(level - 1)
                };
                let activation = (level > 0).then(|| {
                    LeakyReluConfig::new()
                        .with_negative_slope(self.leaky_relu_slope)
                        .init()
                });
                let norm = (level > 0 && level < innermost).then(|| batch_norm(channels(level)));
                DownBlock {
                    activation,
                    conv: Conv2dConfig::new([in_channels, channels(level)], [4, 4])
                        .with_stride([2, 2])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .with_initializer(WEIGHT_INIT)
                        .init(device),
                    norm,
                }
            })
            .collect();

        // Decoder runs from the bottleneck back out; every inner block's output
        // is concatenated with the matching encoder activation.
        let mut ups: Vec<UpBlock<B>> = (0..innermost)
            .rev()
            .enumerate()
            .map(|(index, level)| {
                let in_channels = if level + 1 == innermost {
                    channels(innermost)
                } else {
                    2 * channels(level + 1)
                };
                UpBlock {
                    activation: Relu::new(),
                    deconv: ConvTranspose2dConfig::new([in_channels, channels(level)], [4, 4])
                        .with_stride([2, 2])
                        .with_padding([1, 1])
                        .with_initializer(WEIGHT_INIT)
                        .init(device),
                    norm: Some(batch_norm(channels(level))),
                    dropout: (index < self.dropout_layers)
                        .then(|| DropoutConfig::new(self.dropout).init()),
                }
            })
            .collect();

        ups.push(UpBlock {
            activation: Relu::new(),
            deconv: ConvTranspose2dConfig::new([2 * channels(0), self.out_channels], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_initializer(WEIGHT_INIT)
                .init(device),
            norm: None,
            dropout: None,
        });

        Generator {
            downs,
            ups,
            output: Tanh::new(),
        }
    }
}

impl<B: Backend> DownBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.activation {
            Some(activation) => activation.forward(input),
            None => input,
        };
        let x = self.conv.forward(x);
        match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }
}

impl<B: Backend> UpBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.activation.forward(input);
        x = self.deconv.forward(x);
        if let Some(norm) = &self.norm {
            x = norm.forward(x);
        }
        if let Some(dropout) = &self.dropout {
            x = dropout.forward(x);
        }
        x
    }
}

impl<B: Backend> Generator<B> {
    pub fn forward(&self, sketch: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.downs.len());
        let mut x = sketch;
        for down in &self.downs {
            x = down.forward(x);
            skips.push(x.clone());
        }
        // The bottleneck feeds the decoder directly.
        skips.pop();

        for up in &self.ups {
            x = up.forward(x);
            if let Some(skip) = skips.pop() {
                x = Tensor::cat(vec![x, skip], 1);
            }
        }
        self.output.forward(x)
    }
}

/// PatchGAN discriminator scoring `(image, sketch)` pairs patch by patch.
///
/// The output is a map of raw logits, `[batch, 1, h, w]`, one per receptive
/// field; no sigmoid is applied.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    blocks: Vec<PatchBlock<B>>,
    head: Conv2d<B>,
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    #[config(default = 3)]
    pub image_channels: usize,
    #[config(default = 3)]
    pub sketch_channels: usize,
    #[config(default = 64)]
    pub base_filters: usize,
    /// Stride-2 layers; 3 gives the classic 70x70 receptive field.
    #[config(default = 3)]
    pub n_layers: usize,
    #[config(default = 0.2)]
    pub leaky_relu_slope: f64,
}

#[derive(Module, Debug)]
pub struct PatchBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    activation: LeakyRelu,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        assert!(self.n_layers >= 1, "discriminator needs at least one layer");
        let channels = |level| level_channels(self.base_filters, level);
        let block = |in_channels: usize, out_channels: usize, stride: usize, normalized: bool| {
            PatchBlock {
                conv: Conv2dConfig::new([in_channels, out_channels], [4, 4])
                    .with_stride([stride, stride])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_initializer(WEIGHT_INIT)
                    .init(device),
                norm: normalized.then(|| BatchNormConfig::new(out_channels).init(device)),
                activation: LeakyReluConfig::new()
                    .with_negative_slope(self.leaky_relu_slope)
                    .init(),
            }
        };

        let mut blocks = vec![block(
            self.image_channels + self.sketch_channels,
            channels(0),
            2,
            false,
        )];
        for level in 1..self.n_layers {
            blocks.push(block(channels(level - 1), channels(level), 2, true));
        }
        blocks.push(block(
            channels(self.n_layers - 1),
            channels(self.n_layers),
            1,
            true,
        ));

        Discriminator {
            blocks,
            head: Conv2dConfig::new([channels(self.n_layers), 1], [4, 4])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_initializer(WEIGHT_INIT)
                .init(device),
        }
    }
}

impl<B: Backend> PatchBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.conv.forward(input);
        if let Some(norm) = &self.norm {
            x = norm.forward(x);
        }
        self.activation.forward(x)
    }
}

impl<B: Backend> Discriminator<B> {
    pub fn forward(&self, image: Tensor<B, 4>, sketch: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = Tensor::cat(vec![image, sketch], 1);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub generator: GeneratorConfig,
    pub discriminator: DiscriminatorConfig,
}

impl ModelConfig {
    pub fn init_generator<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        self.generator.init(device)
    }

    pub fn init_discriminator<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        self.discriminator.init(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::tensor::Distribution;
    use rstest::rstest;

    type TestBackend = NdArray;

    #[test]
    fn channel_width_is_capped_at_eight_times_base() {
        let widths: Vec<usize> = (0..6).map(|level| level_channels(64, level)).collect();
        assert_eq!(widths, vec![64, 128, 256, 512, 512, 512]);
    }

    #[test]
    fn generator_preserves_spatial_shape() {
        let device = Default::default();
        let generator = GeneratorConfig::new()
            .with_base_filters(4)
            .with_depth(5)
            .init::<TestBackend>(&device);

        let sketch =
            Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);
        let portrait = generator.forward(sketch);

        assert_eq!(portrait.dims(), [2, 3, 32, 32]);
    }

    #[test]
    fn generator_output_is_bounded_by_tanh() {
        let device = Default::default();
        let generator = GeneratorConfig::new()
            .with_base_filters(4)
            .with_depth(4)
            .init::<TestBackend>(&device);

        let sketch = Tensor::<TestBackend, 4>::random(
            [1, 3, 16, 16],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let values: Vec<f32> = generator.forward(sketch).into_data().to_vec().unwrap();

        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[rstest]
    #[case::frozen(0.0, true)]
    #[case::tracking(0.1, false)]
    fn training_pass_updates_running_statistics_by_momentum(
        #[case] momentum: f64,
        #[case] unchanged: bool,
    ) {
        let device = Default::default();
        let generator = GeneratorConfig::new()
            .with_base_filters(4)
            .with_depth(4)
            .with_batch_norm_momentum(momentum)
            .init::<Autodiff<TestBackend>>(&device);
        let sketch = Tensor::<TestBackend, 4>::random(
            [2, 3, 16, 16],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let before: Vec<f32> = generator
            .valid()
            .forward(sketch.clone())
            .into_data()
            .to_vec()
            .unwrap();
        let _ = generator.forward(Tensor::from_inner(sketch.clone().mul_scalar(3.0)));
        let after: Vec<f32> = generator.valid().forward(sketch).into_data().to_vec().unwrap();

        assert_eq!(before == after, unchanged);
    }

    #[test]
    fn discriminator_emits_patch_map() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new()
            .with_base_filters(4)
            .init::<TestBackend>(&device);

        let image =
            Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);
        let sketch =
            Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);

        // 32 -> 16 -> 8 -> 4 through the strided layers, then 3 and 2.
        assert_eq!(discriminator.forward(image, sketch).dims(), [2, 1, 2, 2]);
    }
}
