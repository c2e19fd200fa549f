//! Linear potency regressor built on Candle.
//!
//! A single `input_dim -> 1` layer whose parameters live in a [`VarMap`] under
//! the names `fc.weight` and `fc.bias`, so a saved safetensors file can be
//! reloaded into any regressor of the same width.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, Optimizer, VarBuilder, VarMap, SGD};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Width of the feature vector carried in `protein_data`.
pub const DEFAULT_INPUT_DIM: usize = 10;

/// Step size used by [`PotencyRegressor::train_step`] unless configured.
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

const LAYER: &str = "fc";

/// Plain-data copy of a regressor's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub weight: Vec<f32>,
    pub bias: f32,
}

pub struct PotencyRegressor {
    varmap: VarMap,
    fc: Linear,
    device: Device,
    input_dim: usize,
}

impl std::fmt::Debug for PotencyRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PotencyRegressor")
            .field("input_dim", &self.input_dim)
            .field("device", &self.device)
            .finish()
    }
}

impl PotencyRegressor {
    /// Fresh regressor with Candle's default initialisation.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(ModelError::InvalidFeatureDimension { expected: 1, actual: 0 });
        }
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let fc = linear(input_dim, 1, vb.pp(LAYER))?;
        Ok(Self { varmap, fc, device, input_dim })
    }

    /// Regressor with the given parameters; the width is `weight.len()`.
    pub fn from_parameters(weight: &[f32], bias: f32) -> Result<Self> {
        let mut model = Self::new(weight.len())?;
        let w = Tensor::from_slice(weight, (1, weight.len()), &model.device)?;
        let b = Tensor::new(&[bias], &model.device)?;
        model.varmap.set_one(format!("{LAYER}.weight"), w)?;
        model.varmap.set_one(format!("{LAYER}.bias"), b)?;
        Ok(model)
    }

    pub fn from_snapshot(snapshot: &WeightSnapshot) -> Result<Self> {
        Self::from_parameters(&snapshot.weight, snapshot.bias)
    }

    /// Load parameters from a safetensors file. Fails when a tensor is
    /// missing or its shape does not match `input_dim`.
    pub fn load(path: impl AsRef<Path>, input_dim: usize) -> Result<Self> {
        let mut model = Self::new(input_dim)?;
        model.varmap.load(path)?;
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// One forward pass.
    pub fn predict(&self, features: &[f32]) -> Result<f32> {
        let input = self.input(features)?;
        let output = self.fc.forward(&input)?;
        first_scalar(&output)
    }

    /// One SGD step on the squared error against `target`.
    ///
    /// Returns the output computed before the parameters were updated.
    pub fn train_step(&mut self, features: &[f32], target: f32, learning_rate: f64) -> Result<f32> {
        let input = self.input(features)?;
        let target = Tensor::new(&[[target]], &self.device)?;

        let mut optimizer = SGD::new(self.varmap.all_vars(), learning_rate)?;
        let output = self.fc.forward(&input)?;
        let loss = candle_nn::loss::mse(&output, &target)?;
        optimizer.backward_step(&loss)?;

        first_scalar(&output)
    }

    pub fn snapshot(&self) -> Result<WeightSnapshot> {
        let weight = self.fc.weight().flatten_all()?.to_vec1::<f32>()?;
        let bias = match self.fc.bias() {
            Some(b) => first_scalar(b)?,
            None => 0.0,
        };
        Ok(WeightSnapshot { weight, bias })
    }

    fn input(&self, features: &[f32]) -> Result<Tensor> {
        if features.len() != self.input_dim {
            return Err(ModelError::InvalidFeatureDimension {
                expected: self.input_dim,
                actual: features.len(),
            });
        }
        Ok(Tensor::from_slice(features, (1, self.input_dim), &self.device)?)
    }
}

fn first_scalar(t: &Tensor) -> Result<f32> {
    Ok(t.flatten_all()?.get(0)?.to_scalar::<f32>()?)
}
