//! Deterministic pseudorandom tensor generator `prg(seed, M, shapes)` (§4.1).
//!
//! Expands a 32-byte seed into the same `ChaCha20Rng` stream on every caller,
//! coordinator and participant alike, the same way the teacher's original
//! pairwise masking used a ChaCha20-seeded stream per shared secret — here
//! generalized from a flat f32 vector to an arbitrary-modulus ragged tensor
//! list so it can mask the quantized integer domain instead of floats.

use crate::vector::{ModTensor, ModVector, Shape};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Produces one tensor per entry in `shapes`, each entry uniform in `[0, modulus)`.
pub fn prg(seed: &[u8; 32], modulus: u64, shapes: &[Shape]) -> ModVector {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    let tensors = shapes
        .iter()
        .map(|shape| {
            let len = shape.iter().product::<usize>().max(1);
            let data = (0..len).map(|_| next_below(&mut rng, modulus)).collect();
            ModTensor {
                shape: shape.clone(),
                data,
            }
        })
        .collect();
    ModVector { tensors }
}

/// Rejection-sampled uniform value in `[0, modulus)` from a 64-bit stream,
/// so the distribution is exactly uniform regardless of `modulus`.
fn next_below(rng: &mut ChaCha20Rng, modulus: u64) -> u64 {
    if modulus == 0 {
        return 0;
    }
    let limit = u64::MAX - (u64::MAX % modulus);
    loop {
        let candidate = rng.next_u64();
        if candidate < limit {
            return candidate % modulus;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let seed = [5u8; 32];
        let shapes = vec![vec![3], vec![2, 2]];
        let a = prg(&seed, 1000, &shapes);
        let b = prg(&seed, 1000, &shapes);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_across_seeds() {
        let shapes = vec![vec![4]];
        let a = prg(&[1u8; 32], 1000, &shapes);
        let b = prg(&[2u8; 32], 1000, &shapes);
        assert_ne!(a, b);
    }

    #[test]
    fn values_stay_below_modulus() {
        let seed = [3u8; 32];
        let shapes = vec![vec![64]];
        let m = 97u64;
        let out = prg(&seed, m, &shapes);
        for v in &out.tensors[0].data {
            assert!(*v < m);
        }
    }

    #[test]
    fn matches_shape_structure() {
        let seed = [1u8; 32];
        let shapes = vec![vec![1], vec![3, 4]];
        let out = prg(&seed, 50, &shapes);
        assert_eq!(out.tensors.len(), 2);
        assert_eq!(out.tensors[0].data.len(), 1);
        assert_eq!(out.tensors[1].data.len(), 12);
    }
}
