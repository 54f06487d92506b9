use crate::error::ModCnnError;
use crate::nn::layers::{
    AnyLayer, ConvolutionGeometry, ConvolutionLayer, FullyConnectedLayer, LayerKind, MaxPoolingLayer,
    PoolingGeometry,
};
use crate::types::Element;
use rand::Rng;

/// Declarative description of one layer.
///
/// `kind` is `"conv"`, `"pool"` or `"fc"`; only the fields that kind needs
/// are read. Stride defaults to 1 and padding to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    pub kind: String,
    pub in_channels: usize,
    pub out_channels: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
    pub padding: usize,
    pub in_features: usize,
    pub out_features: usize,
    /// ReLU after a fully-connected layer.
    pub activated: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        LayerConfig {
            kind: String::new(),
            in_channels: 0,
            out_channels: 0,
            filter_height: 0,
            filter_width: 0,
            pool_height: 0,
            pool_width: 0,
            stride: 1,
            padding: 0,
            in_features: 0,
            out_features: 0,
            activated: true,
        }
    }
}

impl LayerConfig {
    pub fn conv(in_channels: usize, out_channels: usize, filter_height: usize, filter_width: usize) -> Self {
        LayerConfig {
            kind: LayerKind::Convolution.as_str().to_string(),
            in_channels,
            out_channels,
            filter_height,
            filter_width,
            ..LayerConfig::default()
        }
    }

    pub fn pool(pool_height: usize, pool_width: usize) -> Self {
        LayerConfig {
            kind: LayerKind::MaxPooling.as_str().to_string(),
            pool_height,
            pool_width,
            ..LayerConfig::default()
        }
    }

    pub fn fc(in_features: usize, out_features: usize) -> Self {
        LayerConfig {
            kind: LayerKind::FullyConnected.as_str().to_string(),
            in_features,
            out_features,
            ..LayerConfig::default()
        }
    }

    /// Fully-connected layer without ReLU, typically the logits layer.
    pub fn fc_linear(in_features: usize, out_features: usize) -> Self {
        LayerConfig {
            activated: false,
            ..LayerConfig::fc(in_features, out_features)
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// # Errors
    /// `UnknownLayerType` if `kind` is not a known tag.
    pub fn layer_kind(&self) -> Result<LayerKind, ModCnnError> {
        self.kind.parse()
    }

    /// Instantiates the layer, drawing initial weights from `rng`.
    /// Returns the layer and its activation flag.
    pub(crate) fn build<T: Element, R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(AnyLayer<T>, bool), ModCnnError> {
        let layer = match self.layer_kind()? {
            LayerKind::Convolution => {
                let geometry = ConvolutionGeometry {
                    in_channels: self.in_channels,
                    out_channels: self.out_channels,
                    filter_height: self.filter_height,
                    filter_width: self.filter_width,
                    stride: self.stride,
                    padding: self.padding,
                };
                AnyLayer::from(ConvolutionLayer::with_rng(geometry, rng)?)
            }
            LayerKind::MaxPooling => AnyLayer::from(MaxPoolingLayer::from_geometry(PoolingGeometry {
                pool_height: self.pool_height,
                pool_width: self.pool_width,
                stride: self.stride,
                padding: self.padding,
            })?),
            LayerKind::FullyConnected => {
                AnyLayer::from(FullyConnectedLayer::with_rng(self.in_features, self.out_features, rng)?)
            }
        };
        Ok((layer, self.activated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::layers::Layer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_constructors_set_kind_and_defaults() {
        let conv = LayerConfig::conv(1, 4, 3, 3).with_padding(1);
        assert_eq!(conv.kind, "conv");
        assert_eq!(conv.stride, 1);
        assert_eq!(conv.padding, 1);
        assert_eq!(LayerConfig::pool(2, 2).with_stride(2).stride, 2);
        assert!(LayerConfig::fc(4, 2).activated);
        assert!(!LayerConfig::fc_linear(4, 2).activated);
    }

    #[test]
    fn test_build_each_kind() {
        let mut rng = StdRng::seed_from_u64(0);
        let (conv, _) = LayerConfig::conv(1, 2, 3, 3).build::<f32, _>(&mut rng).unwrap();
        assert_eq!(conv.kind(), LayerKind::Convolution);
        assert_eq!(conv.num_params(), 2 * 9 + 2);
        let (pool, _) = LayerConfig::pool(2, 2).build::<f32, _>(&mut rng).unwrap();
        assert_eq!(pool.num_params(), 0);
        let (fc, activated) = LayerConfig::fc_linear(3, 2).build::<f32, _>(&mut rng).unwrap();
        assert_eq!(fc.num_params(), 8);
        assert!(!activated);
    }

    #[test]
    fn test_unknown_kind_is_configuration_failure() {
        let config = LayerConfig {
            kind: "lstm".to_string(),
            ..LayerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            config.build::<f32, _>(&mut rng),
            Err(ModCnnError::UnknownLayerType(ref s)) if s == "lstm"
        ));
    }

    #[test]
    fn test_invalid_geometry_is_reported() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = LayerConfig::conv(1, 1, 3, 3).with_stride(0);
        assert!(matches!(
            config.build::<f32, _>(&mut rng),
            Err(ModCnnError::InvalidGeometry { .. })
        ));
    }
}
