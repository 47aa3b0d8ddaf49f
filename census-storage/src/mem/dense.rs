use crate::traits::DenseNDArray;

/// Placeholder for a dense matrix. It carries only a shape; the query layer
/// refuses to read dense matrices.
#[derive(Clone, Copy, Debug)]
pub struct MemDenseArray {
    shape: (u64, u64),
}

impl MemDenseArray {
    pub fn new(shape: (u64, u64)) -> Self {
        Self { shape }
    }
}

impl DenseNDArray for MemDenseArray {
    fn shape(&self) -> (u64, u64) {
        self.shape
    }
}
