//! Shamir secret sharing over GF(2^128), operating on 16-byte chunks (§4.1).
//!
//! Secrets of arbitrary length are PKCS#7-padded to a 16-byte boundary,
//! chunked, and each chunk is shared independently with the same
//! `(threshold, num)` and the same set of evaluation points
//! `x = 1, 2, ..., num`. A participant's share of the whole secret is the
//! list of `(index, 16-byte share)` pairs, one per chunk — a typed record,
//! never a delimiter-joined blob (§9).
//!
//! Field arithmetic is GF(2^128) with the AES/GHASH reduction polynomial
//! `x^128 + x^7 + x^2 + x + 1`; addition is XOR, which keeps the whole thing
//! branch-free and exactly reproducible.

use crate::error::{Result, SecAggError};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const CHUNK_LEN: usize = 16;

/// One participant's share of one chunk: the evaluation point and `f(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkShare {
    pub index: u8,
    pub value: [u8; CHUNK_LEN],
}

/// A participant's share of an arbitrary-length secret: one [`ChunkShare`] per
/// 16-byte chunk of the padded secret, in chunk order.
pub type SecretShare = Vec<ChunkShare>;

fn gf_mul(mut a: u128, mut b: u128) -> u128 {
    const REDUCTION: u128 = (1 << 7) | (1 << 2) | (1 << 1) | 1; // x^7+x^2+x+1, x^128 folded in below
    let mut result: u128 = 0;
    for _ in 0..128 {
        if b & 1 == 1 {
            result ^= a;
        }
        let carry = a & (1 << 127) != 0;
        a <<= 1;
        if carry {
            a ^= REDUCTION;
        }
        b >>= 1;
    }
    result
}

fn gf_pow(a: u128, mut exp: u128) -> u128 {
    let mut base = a;
    let mut result: u128 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Multiplicative inverse via Fermat's little theorem: the nonzero elements
/// of GF(2^128) form a group of order `2^128 - 1`.
fn gf_inv(a: u128) -> u128 {
    debug_assert_ne!(a, 0);
    gf_pow(a, u128::MAX - 1)
}

fn point(index: u8) -> u128 {
    index as u128
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = CHUNK_LEN - (data.len() % CHUNK_LEN);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

fn pkcs7_unpad(data: &[u8]) -> Result<Vec<u8>> {
    let pad_len = *data
        .last()
        .ok_or_else(|| SecAggError::SecretSharing("empty padded secret".into()))? as usize;
    if pad_len == 0 || pad_len > CHUNK_LEN || pad_len > data.len() {
        return Err(SecAggError::SecretSharing("invalid PKCS#7 padding".into()));
    }
    if !data[data.len() - pad_len..].iter().all(|&b| b as usize == pad_len) {
        return Err(SecAggError::SecretSharing("invalid PKCS#7 padding".into()));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}

fn split_chunk(chunk: &[u8; CHUNK_LEN], threshold: usize, num: usize) -> Vec<ChunkShare> {
    let secret = u128::from_be_bytes(*chunk);
    let mut coeffs = vec![secret];
    let mut rng = rand::rngs::OsRng;
    for _ in 1..threshold {
        let mut buf = [0u8; 16];
        rng.fill_bytes(&mut buf);
        coeffs.push(u128::from_be_bytes(buf));
    }

    (1..=num as u8)
        .map(|i| {
            let x = point(i);
            let mut acc: u128 = 0;
            for coeff in coeffs.iter().rev() {
                acc = gf_mul(acc, x) ^ coeff;
            }
            ChunkShare {
                index: i,
                value: acc.to_be_bytes(),
            }
        })
        .collect()
}

fn combine_chunk(shares: &[ChunkShare], threshold: usize) -> Result<[u8; CHUNK_LEN]> {
    if shares.len() < threshold {
        return Err(SecAggError::SecretSharing(format!(
            "need {threshold} shares, got {}",
            shares.len()
        )));
    }
    let used = &shares[..threshold];
    let mut secret: u128 = 0;
    for (i, share_i) in used.iter().enumerate() {
        let xi = point(share_i.index);
        let yi = u128::from_be_bytes(share_i.value);
        let mut numerator: u128 = 1;
        let mut denominator: u128 = 1;
        for (j, share_j) in used.iter().enumerate() {
            if i == j {
                continue;
            }
            let xj = point(share_j.index);
            numerator = gf_mul(numerator, xj);
            denominator = gf_mul(denominator, xi ^ xj);
        }
        let lagrange_coeff = gf_mul(numerator, gf_inv(denominator));
        secret ^= gf_mul(yi, lagrange_coeff);
    }
    Ok(secret.to_be_bytes())
}

/// Split `secret` into `num` shares with reconstruction threshold `threshold`.
/// Returns one [`SecretShare`] per participant index `1..=num`.
pub fn split(secret: &[u8], threshold: usize, num: usize) -> Result<Vec<SecretShare>> {
    if !(2 <= threshold && threshold <= num && num <= 255) {
        return Err(SecAggError::SecretSharing(
            "require 2 <= threshold <= num <= 255".into(),
        ));
    }
    let padded = pkcs7_pad(secret);
    let mut per_participant: Vec<SecretShare> = vec![Vec::new(); num];

    for chunk in padded.chunks(CHUNK_LEN) {
        let mut buf = [0u8; CHUNK_LEN];
        buf.copy_from_slice(chunk);
        for share in split_chunk(&buf, threshold, num) {
            per_participant[share.index as usize - 1].push(share);
        }
    }
    Ok(per_participant)
}

/// Recover the secret from `threshold`-or-more chunk-aligned shares
/// contributed by distinct participants. `shares[k]` must all carry the
/// share for chunk `k`, i.e. each participant's [`SecretShare`] must have one
/// entry per chunk in chunk order (as produced by [`split`]).
pub fn combine(shares: &[SecretShare], threshold: usize) -> Result<Vec<u8>> {
    let num_chunks = shares
        .first()
        .ok_or_else(|| SecAggError::SecretSharing("no shares provided".into()))?
        .len();
    for s in shares {
        if s.len() != num_chunks {
            return Err(SecAggError::SecretSharing(
                "inconsistent chunk count across shares".into(),
            ));
        }
    }

    let mut padded = Vec::with_capacity(num_chunks * CHUNK_LEN);
    for chunk_idx in 0..num_chunks {
        let chunk_shares: Vec<ChunkShare> = shares.iter().map(|s| s[chunk_idx]).collect();
        padded.extend_from_slice(&combine_chunk(&chunk_shares, threshold)?);
    }
    pkcs7_unpad(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_for_short_secret() {
        let secret = b"b-seed-32-bytes!".to_vec();
        let shares = split(&secret, 3, 5).unwrap();
        let subset = vec![shares[0].clone(), shares[2].clone(), shares[4].clone()];
        let recovered = combine(&subset, 3).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn roundtrips_for_multi_chunk_secret() {
        let secret: Vec<u8> = (0..50u8).collect(); // spans 4 chunks after padding
        let shares = split(&secret, 4, 7).unwrap();
        let subset = vec![
            shares[1].clone(),
            shares[3].clone(),
            shares[5].clone(),
            shares[6].clone(),
        ];
        let recovered = combine(&subset, 4).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn fewer_than_threshold_fails() {
        let secret = b"0123456789abcdef".to_vec();
        let shares = split(&secret, 3, 5).unwrap();
        let subset = vec![shares[0].clone(), shares[1].clone()];
        assert!(combine(&subset, 3).is_err());
    }

    #[test]
    fn any_valid_subset_of_threshold_recovers_same_secret() {
        let secret = b"another secret!!".to_vec();
        let shares = split(&secret, 3, 6).unwrap();
        let a = combine(&[shares[0].clone(), shares[1].clone(), shares[2].clone()], 3).unwrap();
        let b = combine(&[shares[3].clone(), shares[4].clone(), shares[5].clone()], 3).unwrap();
        assert_eq!(a, secret);
        assert_eq!(b, secret);
    }

    #[test]
    fn rejects_invalid_threshold_num() {
        assert!(split(b"x", 1, 5).is_err());
        assert!(split(b"x", 6, 5).is_err());
    }

    #[test]
    fn gf_inverse_is_correct() {
        let a = 0x1234_5678_9abc_def0_1122_3344_5566_7788u128;
        let inv = gf_inv(a);
        assert_eq!(gf_mul(a, inv), 1);
    }
}
