use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_he_normal_variance() {
    let mut rng = StdRng::seed_from_u64(7);
    let fan_in = 50;
    let samples: Vec<f64> = he_normal(&mut rng, fan_in, 20_000).unwrap();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    assert!(mean.abs() < 0.01, "mean {} too far from zero", mean);
    let expected = 2.0 / fan_in as f64;
    assert!((var - expected).abs() / expected < 0.05, "variance {} vs {}", var, expected);
}

#[test]
fn test_he_normal_zero_fan_in() {
    let mut rng = StdRng::seed_from_u64(0);
    let result: Result<Vec<f32>, _> = he_normal(&mut rng, 0, 4);
    assert!(matches!(result, Err(ModCnnError::ConfigurationError(_))));
}

#[test]
fn test_he_normal_is_seeded() {
    let a: Vec<f32> = he_normal(&mut StdRng::seed_from_u64(3), 9, 16).unwrap();
    let b: Vec<f32> = he_normal(&mut StdRng::seed_from_u64(3), 9, 16).unwrap();
    assert_eq!(a, b);
}
