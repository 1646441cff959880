//! Sketch-to-portrait translation with a pix2pix-style conditional GAN on burn.
//!
//! A U-Net [`Generator`](model::architecture::Generator) learns to draw portraits
//! from sketches while a PatchGAN [`Discriminator`](model::architecture::Discriminator)
//! scores `(image, sketch)` pairs. [`model::training::train`] runs the alternating
//! updates with early stopping on the validation L1 loss and keeps the best
//! snapshot under the artifact directory.

pub mod error;
pub mod model;
pub mod utils;

pub use error::{Error, Result};
