use rnlt_core::Tensor;

use crate::error::DatasetResult;

/// Indexed collection of labelled images.
pub trait Dataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image and class label of sample `idx`.
    fn get(&self, idx: usize) -> DatasetResult<(Tensor<f32>, i64)>;
}
