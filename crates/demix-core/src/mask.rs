//! Mask combination (Wiener-style power partition)
//!
//! For each time-frequency bin with raw mask values `p_i` from N sources:
//!
//! ```text
//! denom      = Σ p_i² + eps
//! combined_i = (p_i² + eps / N) / denom
//! ```
//!
//! The combined masks sum to 1 at every bin, including bins where every raw
//! mask is zero (each source then gets 1/N). With N = 2 the numerator term is
//! `eps / 2`.

use ndarray::{Array4, Zip};

use crate::error::{Result, SeparationError};

/// Combine N raw masks of identical shape into N soft masks summing to unity
pub fn combine(raw: &[Array4<f32>], epsilon: f32) -> Result<Vec<Array4<f32>>> {
    let first = raw.first().ok_or_else(|| {
        SeparationError::InvalidInput("at least one raw mask is required".to_string())
    })?;

    for (i, mask) in raw.iter().enumerate().skip(1) {
        if mask.shape() != first.shape() {
            return Err(SeparationError::contract(
                format!("raw mask {}", i),
                first.shape(),
                mask.shape(),
            ));
        }
    }

    let share = epsilon / raw.len() as f32;

    let mut denom = Array4::<f32>::from_elem(first.raw_dim(), epsilon);
    for mask in raw {
        Zip::from(&mut denom).and(mask).for_each(|d, &p| *d += p * p);
    }

    let combined = raw
        .iter()
        .map(|mask| {
            let mut out = Array4::<f32>::zeros(mask.raw_dim());
            Zip::from(&mut out)
                .and(mask)
                .and(&denom)
                .for_each(|o, &p, &d| *o = (p * p + share) / d);
            out
        })
        .collect();

    Ok(combined)
}
