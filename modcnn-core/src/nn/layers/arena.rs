use crate::error::ModCnnError;
use crate::nn::layers::layer::AnyLayer;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(0);

/// Stable handle to a layer owned by a `LayerArena`.
///
/// Operations and optimizer state refer to layers through this id instead of
/// holding references. Ids carry the arena they were issued by, so a handle
/// from one model never resolves in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId {
    arena: u64,
    index: usize,
}

impl LayerId {
    /// Position of the layer in insertion order.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer #{} (arena {})", self.index, self.arena)
    }
}

/// Owner of every layer of a model, in insertion order.
#[derive(Debug)]
pub struct LayerArena<T = f32> {
    id: u64,
    layers: Vec<AnyLayer<T>>,
}

impl<T> Default for LayerArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LayerArena<T> {
    pub fn new() -> Self {
        LayerArena {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            layers: Vec::new(),
        }
    }

    pub fn push(&mut self, layer: impl Into<AnyLayer<T>>) -> LayerId {
        let index = self.layers.len();
        self.layers.push(layer.into());
        LayerId { arena: self.id, index }
    }

    fn resolve(&self, id: LayerId) -> Result<usize, ModCnnError> {
        if id.arena != self.id || id.index >= self.layers.len() {
            return Err(ModCnnError::UnknownLayer(id.to_string()));
        }
        Ok(id.index)
    }

    pub fn get(&self, id: LayerId) -> Result<&AnyLayer<T>, ModCnnError> {
        let index = self.resolve(id)?;
        Ok(&self.layers[index])
    }

    pub fn get_mut(&mut self, id: LayerId) -> Result<&mut AnyLayer<T>, ModCnnError> {
        let index = self.resolve(id)?;
        Ok(&mut self.layers[index])
    }

    /// Ids and layers in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (LayerId, &AnyLayer<T>)> {
        let arena = self.id;
        self.layers
            .iter()
            .enumerate()
            .map(move |(index, layer)| (LayerId { arena, index }, layer))
    }

    pub fn iter_mut(&mut self) -> impl ExactSizeIterator<Item = (LayerId, &mut AnyLayer<T>)> {
        let arena = self.id;
        self.layers
            .iter_mut()
            .enumerate()
            .map(move |(index, layer)| (LayerId { arena, index }, layer))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::layers::{Layer, LayerKind, MaxPoolingLayer};

    #[test]
    fn test_push_and_resolve() {
        let mut arena: LayerArena<f32> = LayerArena::new();
        let a = arena.push(MaxPoolingLayer::new(2, 2, 2, 0).unwrap());
        let b = arena.push(MaxPoolingLayer::new(3, 3, 1, 1).unwrap());
        assert_eq!(arena.len(), 2);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena.get(b).unwrap().kind(), LayerKind::MaxPooling);
        let ids: Vec<LayerId> = arena.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_foreign_id_rejected() {
        let mut first: LayerArena<f32> = LayerArena::new();
        let mut second: LayerArena<f32> = LayerArena::new();
        let id = first.push(MaxPoolingLayer::new(2, 2, 2, 0).unwrap());
        assert!(matches!(second.get_mut(id), Err(ModCnnError::UnknownLayer(_))));
        assert!(second.is_empty());
    }
}
