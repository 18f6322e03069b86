use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rnlt_core::Tensor;

use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};

/// Batches samples of a [`Dataset`] into `([B, ...], labels)` pairs.
///
/// Without shuffling, batches follow dataset order. With
/// [`DataLoader::shuffled`] the order is a permutation drawn from a seeded
/// rng, and each [`reset`](DataLoader::reset) draws the next permutation.
/// The last batch may be short.
pub struct DataLoader<'a, D: Dataset> {
    dataset: &'a D,
    batch_size: usize,
    rng: Option<StdRng>,
    indices: Vec<usize>,
    current: usize,
}

impl<'a, D: Dataset> DataLoader<'a, D> {
    pub fn new(dataset: &'a D, batch_size: usize) -> DatasetResult<Self> {
        if batch_size == 0 {
            return Err(DatasetError::Config("batch_size must be at least 1".into()));
        }
        Ok(DataLoader {
            dataset,
            batch_size,
            rng: None,
            indices: (0..dataset.len()).collect(),
            current: 0,
        })
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.indices.shuffle(&mut rng);
        self.rng = Some(rng);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Rewind to the first batch, reshuffling if shuffling is enabled.
    pub fn reset(&mut self) {
        self.current = 0;
        if let Some(rng) = &mut self.rng {
            self.indices.shuffle(rng);
        }
    }

    fn collate(&self, batch: &[usize]) -> DatasetResult<(Tensor<f32>, Vec<i64>)> {
        let mut images = Vec::with_capacity(batch.len());
        let mut labels = Vec::with_capacity(batch.len());
        for &idx in batch {
            let (image, label) = self.dataset.get(idx)?;
            images.push(image);
            labels.push(label);
        }
        let refs: Vec<&Tensor<f32>> = images.iter().collect();
        Ok((Tensor::stack(&refs)?, labels))
    }
}

impl<'a, D: Dataset> Iterator for DataLoader<'a, D> {
    type Item = DatasetResult<(Tensor<f32>, Vec<i64>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.indices.len() {
            return None;
        }
        let end = (self.current + self.batch_size).min(self.indices.len());
        let batch = self.collate(&self.indices[self.current..end]);
        self.current = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample `i` is a `[1, 2, 2]` image filled with `i`, labelled `i`.
    struct Counting(usize);

    impl Dataset for Counting {
        fn len(&self) -> usize {
            self.0
        }

        fn get(&self, idx: usize) -> DatasetResult<(Tensor<f32>, i64)> {
            if idx >= self.0 {
                return Err(DatasetError::IndexOutOfBounds { index: idx, len: self.0 });
            }
            Ok((Tensor::full(vec![1, 2, 2], idx as f32), idx as i64))
        }
    }

    #[test]
    fn test_ordered_batches() {
        let ds = Counting(5);
        let loader = DataLoader::new(&ds, 2).unwrap();
        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<_> = loader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0.shape_vec(), vec![2, 1, 2, 2]);
        assert_eq!(batches[0].1, vec![0, 1]);
        assert_eq!(batches[2].0.shape_vec(), vec![1, 1, 2, 2]);
        assert_eq!(batches[2].1, vec![4]);
        assert_eq!(batches[1].0.data()[0], 2.0);
        assert_eq!(batches[1].0.data()[4], 3.0);
    }

    #[test]
    fn test_shuffle_is_seeded_permutation() {
        let ds = Counting(10);
        let labels = |seed: u64| -> Vec<i64> {
            DataLoader::new(&ds, 3)
                .unwrap()
                .shuffled(seed)
                .flat_map(|b| b.unwrap().1)
                .collect()
        };
        let a = labels(1);
        assert_eq!(a, labels(1));
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<i64>>());
    }

    #[test]
    fn test_reset_rewinds() {
        let ds = Counting(4);
        let mut loader = DataLoader::new(&ds, 4).unwrap();
        assert!(loader.next().is_some());
        assert!(loader.next().is_none());
        loader.reset();
        assert_eq!(loader.next().unwrap().unwrap().1, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_batch_size() {
        assert!(matches!(
            DataLoader::new(&Counting(1), 0),
            Err(DatasetError::Config(_))
        ));
    }
}
