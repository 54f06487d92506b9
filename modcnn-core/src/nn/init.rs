use crate::error::ModCnnError;
use crate::types::Element;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// He (Kaiming) normal initialisation: `len` samples from `N(0, 2 / fan_in)`.
///
/// # Errors
/// `ConfigurationError` when `fan_in` is zero.
pub fn he_normal<T, R>(rng: &mut R, fan_in: usize, len: usize) -> Result<Vec<T>, ModCnnError>
where
    T: Element,
    R: Rng + ?Sized,
{
    if fan_in == 0 {
        return Err(ModCnnError::ConfigurationError(
            "He initialisation requires a non-zero fan_in".to_string(),
        ));
    }
    let std_dev = (2.0 / fan_in as f64).sqrt();
    let dist = Normal::new(0.0, std_dev)
        .map_err(|e| ModCnnError::ConfigurationError(format!("Invalid normal distribution: {}", e)))?;
    Ok((0..len).map(|_| T::from_scalar(dist.sample(rng))).collect())
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests;
