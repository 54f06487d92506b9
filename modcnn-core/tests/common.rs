use modcnn_core::tensor::Tensor;
use modcnn_core::LayerConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

// Shared by several test crates; not every crate uses every helper.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Uniform values in [-1, 1).
#[allow(dead_code)]
pub fn random_tensor(shape: [usize; 4], seed: u64) -> Tensor<f64> {
    let mut rng = seeded_rng(seed);
    let dist = Uniform::new(-1.0, 1.0);
    let data = (0..shape.iter().product::<usize>())
        .map(|_| dist.sample(&mut rng))
        .collect();
    Tensor::from_vec(data, shape).expect("Test tensor creation failed")
}

/// conv(1 -> 4, 3x3, pad 1) -> pool 2x2/2 -> conv(4 -> 4, 3x3, pad 1) -> pool 2x2/2
/// -> fc(16 -> 8) -> fc_linear(8 -> 3), for `[n, 1, 8, 8]` inputs.
#[allow(dead_code)]
pub fn small_cnn() -> Vec<LayerConfig> {
    vec![
        LayerConfig::conv(1, 4, 3, 3).with_padding(1),
        LayerConfig::pool(2, 2).with_stride(2),
        LayerConfig::conv(4, 4, 3, 3).with_padding(1),
        LayerConfig::pool(2, 2).with_stride(2),
        LayerConfig::fc(4 * 2 * 2, 8),
        LayerConfig::fc_linear(8, 3),
    ]
}
