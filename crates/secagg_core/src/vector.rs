//! Ragged-tensor arithmetic: the masked-domain vector operations of §4.3, plus
//! the quantization map of §4.2.
//!
//! A participant's model update is not one flat vector but a list of tensors
//! of independent shape (one per model layer). We carry that shape alongside
//! the flat data so reverse-quantization can hand the strategy back parameters
//! with the same layout it gave us.

use crate::error::{Result, SecAggError};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub type Shape = Vec<usize>;

/// A list of tensors in the float domain, ragged (each its own shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FloatVector {
    pub tensors: Vec<FloatTensor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatTensor {
    pub shape: Shape,
    pub data: Vec<f64>,
}

/// A list of tensors in the masked/modular domain: nonnegative integers < M.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModVector {
    pub tensors: Vec<ModTensor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModTensor {
    pub shape: Shape,
    pub data: Vec<u64>,
}

impl FloatVector {
    pub fn shapes(&self) -> Vec<Shape> {
        self.tensors.iter().map(|t| t.shape.clone()).collect()
    }

    /// Quantize every tensor per §4.2: `q(x) = min(T-1, floor((clip(x,-C,C)+C)*T/(2C)))`.
    /// Emits a warning (not an error) if any value needed clipping.
    pub fn quantize(&self, clipping_range: f64, target_range: u64) -> ModVector {
        let c = clipping_range;
        let t = target_range as f64;
        let mut out_of_range = false;

        let tensors = self
            .tensors
            .iter()
            .map(|tensor| {
                let data = tensor
                    .data
                    .iter()
                    .map(|&x| {
                        if x < -c || x > c {
                            out_of_range = true;
                        }
                        let clipped = x.clamp(-c, c);
                        let scaled = ((clipped + c) * t / (2.0 * c)).floor();
                        let q = scaled.min(target_range as f64 - 1.0).max(0.0);
                        q as u64
                    })
                    .collect();
                ModTensor {
                    shape: tensor.shape.clone(),
                    data,
                }
            })
            .collect();

        if out_of_range {
            warn!("quantize: input value outside clipping range, clipped");
        }

        ModVector { tensors }
    }
}

impl FloatVector {
    /// Reverse quantization applied directly to already-averaged float
    /// values (§4.5 reconstruction: division by `total_weights_factor`
    /// happens before this step, so the input here need not be integral).
    pub fn reverse_quantize(&self, clipping_range: f64, target_range: u64) -> FloatVector {
        let c = clipping_range;
        let t = target_range as f64;
        let tensors = self
            .tensors
            .iter()
            .map(|tensor| FloatTensor {
                shape: tensor.shape.clone(),
                data: tensor.data.iter().map(|&q| q * (2.0 * c) / t - c).collect(),
            })
            .collect();
        FloatVector { tensors }
    }
}

impl ModVector {
    /// Reverse quantization: `x_hat = q * (2C)/T - C`, applied elementwise.
    pub fn reverse_quantize(&self, clipping_range: f64, target_range: u64) -> FloatVector {
        let c = clipping_range;
        let t = target_range as f64;
        let tensors = self
            .tensors
            .iter()
            .map(|tensor| {
                let data = tensor
                    .data
                    .iter()
                    .map(|&q| (q as f64) * (2.0 * c) / t - c)
                    .collect();
                FloatTensor {
                    shape: tensor.shape.clone(),
                    data,
                }
            })
            .collect();
        FloatVector { tensors }
    }

    pub fn shapes(&self) -> Vec<Shape> {
        self.tensors.iter().map(|t| t.shape.clone()).collect()
    }

    pub fn zero(shapes: &[Shape]) -> Self {
        ModVector {
            tensors: shapes
                .iter()
                .map(|shape| ModTensor {
                    shape: shape.clone(),
                    data: vec![0u64; shape_len(shape)],
                })
                .collect(),
        }
    }

    fn check_shape(&self, other: &ModVector) -> Result<()> {
        if self.tensors.len() != other.tensors.len() {
            return Err(SecAggError::ShapeMismatch);
        }
        for (a, b) in self.tensors.iter().zip(other.tensors.iter()) {
            if a.shape != b.shape || a.data.len() != b.data.len() {
                return Err(SecAggError::ShapeMismatch);
            }
        }
        Ok(())
    }

    pub fn add(&self, other: &ModVector, modulus: u64) -> Result<ModVector> {
        self.check_shape(other)?;
        Ok(self.zip_map(other, |a, b| (a + b) % modulus))
    }

    pub fn sub(&self, other: &ModVector, modulus: u64) -> Result<ModVector> {
        self.check_shape(other)?;
        Ok(self.zip_map(other, |a, b| (a + modulus - (b % modulus)) % modulus))
    }

    pub fn scalar_mul(&self, scalar: u64, modulus: u64) -> ModVector {
        self.map(|v| mulmod(v, scalar, modulus))
    }

    /// Exact scalar division. Used only to divide by `total_weights_factor`
    /// after reconstruction; per the design's resolved open question, this
    /// happens as a float conversion, not modular inverse arithmetic.
    pub fn scalar_div_as_float(&self, scalar: u64) -> FloatVector {
        let tensors = self
            .tensors
            .iter()
            .map(|t| FloatTensor {
                shape: t.shape.clone(),
                data: t.data.iter().map(|&v| v as f64 / scalar as f64).collect(),
            })
            .collect();
        FloatVector { tensors }
    }

    pub fn modulo(&self, modulus: u64) -> ModVector {
        self.map(|v| v % modulus)
    }

    fn zip_map(&self, other: &ModVector, f: impl Fn(u64, u64) -> u64) -> ModVector {
        let tensors = self
            .tensors
            .iter()
            .zip(other.tensors.iter())
            .map(|(a, b)| ModTensor {
                shape: a.shape.clone(),
                data: a.data.iter().zip(b.data.iter()).map(|(&x, &y)| f(x, y)).collect(),
            })
            .collect();
        ModVector { tensors }
    }

    fn map(&self, f: impl Fn(u64) -> u64) -> ModVector {
        let tensors = self
            .tensors
            .iter()
            .map(|t| ModTensor {
                shape: t.shape.clone(),
                data: t.data.iter().map(|&v| f(v)).collect(),
            })
            .collect();
        ModVector { tensors }
    }

    /// Prepend a singleton tensor `[value]` — used to carry `weights_factor`
    /// through the sum so it survives reconstruction exactly (§4.4 H3 step 4).
    pub fn prepend_scalar(mut self, value: u64) -> ModVector {
        self.tensors.insert(
            0,
            ModTensor {
                shape: vec![1],
                data: vec![value],
            },
        );
        self
    }

    /// Split off the leading singleton tensor, returning `(value, rest)`.
    pub fn split_leading_scalar(mut self) -> Result<(u64, ModVector)> {
        if self.tensors.is_empty() {
            return Err(SecAggError::ShapeMismatch);
        }
        let head = self.tensors.remove(0);
        if head.data.len() != 1 {
            return Err(SecAggError::ShapeMismatch);
        }
        Ok((head.data[0], self))
    }
}

fn shape_len(shape: &[usize]) -> usize {
    shape.iter().product::<usize>().max(1)
}

fn mulmod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}
