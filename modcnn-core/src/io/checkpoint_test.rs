use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sample_layers() -> Vec<(AnyLayer<f64>, bool)> {
    let mut rng = StdRng::seed_from_u64(11);
    let geometry = ConvolutionGeometry {
        in_channels: 2,
        out_channels: 3,
        filter_height: 3,
        filter_width: 2,
        stride: 2,
        padding: 1,
    };
    vec![
        (ConvolutionLayer::with_rng(geometry, &mut rng).unwrap().into(), true),
        (MaxPoolingLayer::new(2, 3, 1, 1).unwrap().into(), true),
        (FullyConnectedLayer::with_rng(12, 5, &mut rng).unwrap().into(), true),
        (FullyConnectedLayer::with_rng(5, 2, &mut rng).unwrap().into(), false),
    ]
}

fn save(layers: &[(AnyLayer<f64>, bool)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    save_layers(&mut bytes, layers.iter().map(|(l, a)| (l, *a))).unwrap();
    bytes
}

#[test]
fn test_pool_layout_is_exact() {
    let layers: Vec<(AnyLayer<f32>, bool)> = vec![(MaxPoolingLayer::new(2, 2, 2, 0).unwrap().into(), true)];
    let mut bytes = Vec::new();
    save_layers(&mut bytes, layers.iter().map(|(l, a)| (l, *a))).unwrap();
    let expected: Vec<u8> = [1u32, 1, 2, 2, 2, 0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    assert_eq!(bytes, expected);
}

#[test]
fn test_fc_layout_ends_with_flag() {
    let weights = ParamArray::new(vec![1, 2], vec![1.5f32, -2.0]).unwrap();
    let biases = ParamArray::new(vec![1], vec![0.25f32]).unwrap();
    let fc: AnyLayer<f32> = FullyConnectedLayer::from_parameters(weights, biases).unwrap().into();
    let mut bytes = Vec::new();
    save_layers(&mut bytes, [(&fc, false)]).unwrap();

    let mut expected = Vec::new();
    expected.extend(1u32.to_le_bytes());
    expected.extend(2i32.to_le_bytes());
    expected.extend(2u32.to_le_bytes());
    expected.extend(1u32.to_le_bytes());
    for v in [1.5f32, -2.0, 0.25] {
        expected.extend(v.to_le_bytes());
    }
    expected.push(0);
    assert_eq!(bytes, expected);
}

#[test]
fn test_round_trip_preserves_order_shapes_and_values() {
    let layers = sample_layers();
    let bytes = save(&layers);
    let loaded: Vec<LoadedLayer<f64>> = load_layers(&mut bytes.as_slice()).unwrap();
    assert_eq!(loaded.len(), layers.len());

    for ((original, activated), restored) in layers.iter().zip(&loaded) {
        assert_eq!(original.kind(), restored.layer.kind());
        assert_eq!(*activated, restored.activated);
        match (original, &restored.layer) {
            (AnyLayer::Convolution(a), AnyLayer::Convolution(b)) => {
                assert_eq!(a.geometry(), b.geometry());
                assert_eq!(a.filters(), b.filters());
                assert_eq!(a.biases(), b.biases());
            }
            (AnyLayer::MaxPooling(a), AnyLayer::MaxPooling(b)) => {
                assert_eq!(a.geometry(), b.geometry());
            }
            (AnyLayer::FullyConnected(a), AnyLayer::FullyConnected(b)) => {
                assert_eq!(a.weights(), b.weights());
                assert_eq!(a.biases(), b.biases());
            }
            _ => panic!("layer kinds diverged"),
        }
    }
    // Saving the restored layers reproduces the same bytes.
    let again = save(&loaded.into_iter().map(|l| (l.layer, l.activated)).collect::<Vec<_>>());
    assert_eq!(again, bytes);
}

#[test]
fn test_empty_checkpoint() {
    let empty: Vec<(AnyLayer<f32>, bool)> = Vec::new();
    let mut bytes = Vec::new();
    save_layers(&mut bytes, empty.iter().map(|(l, a)| (l, *a))).unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 0]);
    assert!(load_layers::<f32>(&mut bytes.as_slice()).unwrap().is_empty());
}

#[test]
fn test_unknown_discriminant_rejected() {
    let mut bytes = Vec::new();
    bytes.extend(1u32.to_le_bytes());
    bytes.extend(9i32.to_le_bytes());
    assert!(matches!(
        load_layers::<f32>(&mut bytes.as_slice()),
        Err(ModCnnError::UnknownLayerDiscriminant(9))
    ));
}

#[test]
fn test_truncated_checkpoint_rejected() {
    let bytes = save(&sample_layers());
    for cut in [2, 6, 20, bytes.len() - 1] {
        let result = load_layers::<f64>(&mut &bytes[..cut]);
        assert!(
            matches!(result, Err(ModCnnError::CheckpointFormat(_))),
            "cut at {} gave {:?}",
            cut,
            result
        );
    }
}

#[test]
fn test_bad_activation_flag_rejected() {
    let mut bytes = save(&sample_layers()[3..]);
    let last = bytes.len() - 1;
    bytes[last] = 7;
    assert!(matches!(
        load_layers::<f64>(&mut bytes.as_slice()),
        Err(ModCnnError::CheckpointFormat(_))
    ));
}

#[test]
fn test_invalid_geometry_rejected() {
    // A pooling layer with zero stride.
    let bytes: Vec<u8> = [1u32, 1, 2, 2, 0, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
    assert!(matches!(
        load_layers::<f32>(&mut bytes.as_slice()),
        Err(ModCnnError::InvalidGeometry { .. })
    ));
}
