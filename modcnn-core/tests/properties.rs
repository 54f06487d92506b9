mod common;

use approx::assert_relative_eq;
use modcnn_core::autograd::grad_check::check_grad;
use modcnn_core::nn::layers::{
    AnyLayer, ConvolutionGeometry, ConvolutionLayer, FullyConnectedLayer, Layer, LayerArena, MaxPoolingLayer,
};
use modcnn_core::optim::{AmsGrad, AmsGradConfig};
use modcnn_core::{CrossEntropyLoss, ParamArray, Reduction, Tensor};

#[test]
fn test_convolution_output_size_law() {
    for (h, f, p, s, expected) in [(5, 3, 1, 1, 5), (5, 3, 0, 2, 2), (7, 3, 1, 2, 4), (4, 4, 0, 1, 1)] {
        let geometry = ConvolutionGeometry {
            in_channels: 1,
            out_channels: 1,
            filter_height: f,
            filter_width: f,
            stride: s,
            padding: p,
        };
        assert_eq!(geometry.output_size(h, h).unwrap(), (expected, expected));
        let mut layer: ConvolutionLayer<f64> =
            ConvolutionLayer::with_rng(geometry, &mut common::seeded_rng(0)).unwrap();
        let out = layer.forward(&Tensor::zeros([1, 1, h, h])).unwrap();
        assert_eq!(out.shape(), [1, 1, expected, expected]);
    }
}

#[test]
fn test_max_pool_argmax_law() {
    let mut pool = MaxPoolingLayer::new(2, 2, 2, 0).unwrap();
    let input = Tensor::from_vec(vec![1.0f64, 3.0, 2.0, 0.0], [1, 1, 2, 2]).unwrap();
    let out = pool.forward(&input).unwrap();
    assert_eq!(out.data(), &[3.0]);
    let d_in = pool.backward(&Tensor::from_vec(vec![1.0], [1, 1, 1, 1]).unwrap()).unwrap();
    assert_eq!(d_in.data(), &[0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_cross_entropy_round_trip() {
    let mut pred = Tensor::from_vec(vec![0.7f64, 0.2, 0.1], [1, 3, 1, 1]).unwrap();
    let target = Tensor::from_vec(vec![1.0, 0.0, 0.0], [1, 3, 1, 1]).unwrap();
    let loss = CrossEntropyLoss::new(Reduction::Mean);
    assert_relative_eq!(loss.forward(&pred, &target).unwrap(), -(0.7f64).ln(), epsilon = 1e-12);
    loss.backward(&mut pred, &target).unwrap();
    assert_relative_eq!(pred.grad()[0], 0.7 - 1.0, epsilon = 1e-12);
}

#[test]
fn test_fully_connected_gradient_check_law() {
    let mut rng = common::seeded_rng(21);
    let layer: FullyConnectedLayer<f64> = FullyConnectedLayer::with_rng(6, 4, &mut rng).unwrap();
    let input = common::random_tensor([3, 6, 1, 1], 22);
    let upstream = common::random_tensor([3, 4, 1, 1], 23);

    let mut probe = layer.clone();
    probe.forward(&input).unwrap();
    probe.backward(&upstream).unwrap();

    check_grad(
        |w: &[f64]| {
            let mut l = layer.clone();
            l.set_weights(ParamArray::new(vec![4, 6], w.to_vec())?)?;
            let out = l.forward(&input)?;
            Ok(out.data().iter().zip(upstream.data()).map(|(a, b)| a * b).sum())
        },
        layer.weights().values(),
        probe.d_weights().values(),
        1e-6,
        1e-4,
    )
    .unwrap();
}

#[test]
fn test_amsgrad_v_hat_is_monotonic() {
    let mut arena: LayerArena<f64> = LayerArena::new();
    let layer = FullyConnectedLayer::from_parameters(
        ParamArray::new(vec![1, 1], vec![0.5]).unwrap(),
        ParamArray::new(vec![1], vec![0.0]).unwrap(),
    )
    .unwrap();
    let id = arena.push(layer);
    let mut optimizer = AmsGrad::new(AmsGradConfig::default()).unwrap();

    let mut previous = 0.0;
    for g in [4.0, -3.0, 0.5, 0.0, 0.1, -0.2, 2.5, 0.0] {
        let grads = ParamArray::new(vec![1, 1], vec![g]).unwrap();
        let bias_grads = ParamArray::new(vec![1], vec![0.0]).unwrap();
        if let AnyLayer::FullyConnected(fc) = arena.get_mut(id).unwrap() {
            optimizer.update_fully_connected(id, fc, &grads, &bias_grads).unwrap();
        }
        let v_hat = optimizer.state(id).unwrap().weights().v_hat().values()[0];
        assert!(v_hat >= previous);
        previous = v_hat;
    }
}

#[test]
fn test_zero_grad_idempotence() {
    let mut tensor = common::random_tensor([2, 2, 2, 2], 30);
    let data = tensor.data().to_vec();
    tensor.accumulate_grad(&vec![1.5; 16]).unwrap();
    tensor.zero_grad();
    tensor.zero_grad();
    assert!(tensor.grad().iter().all(|&g| g == 0.0));
    assert_eq!(tensor.data(), data.as_slice());

    let mut layer: ConvolutionLayer<f64> = ConvolutionLayer::new(2, 1, 2, 2, 1, 0).unwrap();
    let filters = layer.filters().clone();
    layer.forward(&tensor).unwrap();
    layer.backward(&Tensor::new(2, 1, 1, 1, 1.0)).unwrap();
    layer.zero_grad();
    layer.zero_grad();
    assert!(layer.d_filters().values().iter().all(|&g| g == 0.0));
    assert!(layer.d_biases().values().iter().all(|&g| g == 0.0));
    assert_eq!(layer.filters(), &filters);
}
