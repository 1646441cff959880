use burn::prelude::*;

use crate::model::architecture::Discriminator;

/// Binary cross-entropy on raw logits, averaged over every element.
///
/// Uses `max(x, 0) - x * t + log(1 + exp(-|x|))`, which stays finite for large logits.
pub fn bce_with_logits<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let loss = logits.clone().clamp_min(0.0) - logits.clone() * targets
        + logits.abs().neg().exp().log1p();
    loss.mean()
}

/// Mean absolute error.
pub fn l1_loss<B: Backend, const D: usize>(
    prediction: Tensor<B, D>,
    target: Tensor<B, D>,
) -> Tensor<B, 1> {
    (prediction - target).abs().mean()
}

/// Returns `tensor` cut from its computation graph. The argument's own graph is untouched,
/// so a clone passed here can still backpropagate elsewhere.
pub fn stop_gradient<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.detach()
}

pub struct DiscriminatorLoss<B: Backend> {
    pub real: Tensor<B, 1>,
    pub fake: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

pub struct GeneratorLoss<B: Backend> {
    pub adversarial: Tensor<B, 1>,
    /// Unweighted; `total` applies the L1 weight.
    pub l1: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

/// Real pairs are pushed towards 1 and generated pairs towards 0; `total` is the
/// mean of the two halves. `fake` is expected to be cut from the generator's graph.
pub fn discriminator_loss<B: Backend>(
    discriminator: &Discriminator<B>,
    sketch: Tensor<B, 4>,
    portrait: Tensor<B, 4>,
    fake: Tensor<B, 4>,
) -> DiscriminatorLoss<B> {
    let real_output = discriminator.forward(portrait, sketch.clone());
    let real = bce_with_logits(real_output.clone(), real_output.ones_like());

    let fake_output = discriminator.forward(fake, sketch);
    let fake = bce_with_logits(fake_output.clone(), fake_output.zeros_like());

    let total = (real.clone() + fake.clone()) * 0.5;
    DiscriminatorLoss { real, fake, total }
}

pub fn generator_loss<B: Backend>(
    discriminator: &Discriminator<B>,
    sketch: Tensor<B, 4>,
    portrait: Tensor<B, 4>,
    fake: Tensor<B, 4>,
    l1_weight: f64,
) -> GeneratorLoss<B> {
    let fake_output = discriminator.forward(fake.clone(), sketch);
    let adversarial = bce_with_logits(fake_output.clone(), fake_output.ones_like());

    let l1 = l1_loss(fake, portrait);

    let total = adversarial.clone() + l1.clone() * l1_weight;
    GeneratorLoss {
        adversarial,
        l1,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::architecture::DiscriminatorConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn scalar(tensor: Tensor<TestBackend, 1>) -> f32 {
        tensor.into_scalar()
    }

    #[test]
    fn bce_with_zero_logits_is_ln_two() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 3], &device);

        let against_ones = scalar(bce_with_logits(logits.clone(), logits.ones_like()));
        let against_zeros = scalar(bce_with_logits(logits.clone(), logits.zeros_like()));

        assert!((against_ones - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((against_zeros - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn bce_stays_finite_for_extreme_logits() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 1>::from_floats([200.0, -200.0], &device);
        let targets = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0], &device);

        let loss = scalar(bce_with_logits(logits, targets));

        assert!((loss - 200.0).abs() < 1e-3);
    }

    #[test]
    fn bce_matches_reference_value() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 1>::from_floats([2.0], &device);
        let targets = Tensor::<TestBackend, 1>::from_floats([1.0], &device);

        // -ln(sigmoid(2))
        let expected = (1.0f32 + (-2.0f32).exp()).ln();
        assert!((scalar(bce_with_logits(logits, targets)) - expected).abs() < 1e-6);
    }

    #[test]
    fn l1_is_mean_absolute_difference() {
        let device = Default::default();
        let prediction = Tensor::<TestBackend, 1>::from_floats([1.0, -1.0, 0.5, 0.0], &device);
        let target = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 0.5, -1.0], &device);

        assert_eq!(scalar(l1_loss(prediction, target)), 1.0);
    }

    #[test]
    fn stop_gradient_blocks_backpropagation() {
        let device = Default::default();
        let x = Tensor::<TestAutodiffBackend, 1>::from_floats([3.0], &device).require_grad();

        let doubled = x.clone() * 2.0;
        let loss = (stop_gradient(doubled) * x.clone()).sum();
        let grads = loss.backward();

        // Only the direct factor contributes: d/dx (6 * x) = 6.
        let grad: Vec<f32> = x.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert_eq!(grad, vec![6.0]);
    }

    #[test]
    fn stop_gradient_leaves_original_graph_attached() {
        let device = Default::default();
        let x = Tensor::<TestAutodiffBackend, 1>::from_floats([3.0], &device).require_grad();

        let doubled = x.clone() * 2.0;
        let _detached = stop_gradient(doubled.clone());
        let grads = doubled.sum().backward();

        let grad: Vec<f32> = x.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert_eq!(grad, vec![2.0]);
    }

    fn tiny_batch(device: &<TestBackend as Backend>::Device) -> [Tensor<TestBackend, 4>; 3] {
        let shape = [2, 3, 32, 32];
        let sample =
            || Tensor::<TestBackend, 4>::random(shape, Distribution::Uniform(-1.0, 1.0), device);
        [sample(), sample(), sample()]
    }

    #[test]
    fn discriminator_loss_averages_two_non_negative_terms() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new()
            .with_base_filters(4)
            .init::<TestBackend>(&device);
        let [sketch, portrait, fake] = tiny_batch(&device);

        let loss = discriminator_loss(&discriminator, sketch, portrait, fake);
        let real = scalar(loss.real);
        let fake = scalar(loss.fake);
        let total = scalar(loss.total);

        assert!(real >= 0.0 && fake >= 0.0);
        assert!((total - 0.5 * (real + fake)).abs() < 1e-6);
    }

    #[test]
    fn generator_loss_weights_l1_term() {
        let device = Default::default();
        let discriminator = DiscriminatorConfig::new()
            .with_base_filters(4)
            .init::<TestBackend>(&device);
        let [sketch, portrait, fake] = tiny_batch(&device);

        let loss = generator_loss(&discriminator, sketch, portrait, fake, 100.0);
        let adversarial = scalar(loss.adversarial);
        let l1 = scalar(loss.l1);
        let total = scalar(loss.total);

        assert!(adversarial >= 0.0 && l1 >= 0.0);
        assert!((total - (adversarial + 100.0 * l1)).abs() < 1e-3);
    }
}
