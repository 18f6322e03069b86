use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};
use crate::ops;
use crate::shape::Shape;

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use std::fmt;

/// N-dimensional tensor stored as a flat row-major `Vec<T>`.
#[derive(Debug, Clone)]
pub struct Tensor<T: Float> {
    data: Vec<T>,
    shape: Shape,
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> TensorResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: s.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor { data, shape: s })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ZERO)
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ONE)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![value; s.numel()],
            shape: s,
        }
    }

    /// Create a 1-D tensor from a slice.
    pub fn from_slice(data: &[T]) -> Self {
        Tensor {
            data: data.to_vec(),
            shape: Shape::new(vec![data.len()]),
        }
    }

    /// Tensor of samples from `N(mean, std²)`.
    pub fn normal<R: Rng + ?Sized>(
        shape: Vec<usize>,
        mean: f64,
        std: f64,
        rng: &mut R,
    ) -> TensorResult<Self> {
        let mut t = Self::zeros(shape);
        t.fill_normal(mean, std, rng)?;
        Ok(t)
    }

    /// Tensor of samples from `U[low, high)`.
    pub fn uniform<R: Rng + ?Sized>(
        shape: Vec<usize>,
        low: f64,
        high: f64,
        rng: &mut R,
    ) -> TensorResult<Self> {
        let mut t = Self::zeros(shape);
        t.fill_uniform(low, high, rng)?;
        Ok(t)
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Multi-dimensional indexing.
    pub fn get(&self, indices: &[usize]) -> TensorResult<T> {
        if indices.len() != self.ndim() {
            return Err(TensorError::DimensionMismatch(format!(
                "expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let mut offset = 0;
        for (axis, (&idx, &stride)) in indices.iter().zip(self.shape.strides().iter()).enumerate() {
            let size = self.dims()[axis];
            if idx >= size {
                return Err(TensorError::IndexOutOfBounds {
                    index: idx,
                    axis,
                    size,
                });
            }
            offset += idx * stride;
        }
        Ok(self.data[offset])
    }

    // ─── In-place Fill ──────────────────────────────────────────────────────

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Overwrite every element with a draw from `N(mean, std²)`.
    ///
    /// `std` must be finite and non-negative.
    pub fn fill_normal<R: Rng + ?Sized>(
        &mut self,
        mean: f64,
        std: f64,
        rng: &mut R,
    ) -> TensorResult<()> {
        if !(std >= 0.0 && std.is_finite()) {
            return Err(TensorError::InvalidOperation(format!(
                "normal: std must be finite and non-negative, got {}",
                std
            )));
        }
        let dist = Normal::new(mean, std).map_err(|e| {
            TensorError::InvalidOperation(format!("normal(mean={}, std={}): {}", mean, std, e))
        })?;
        for v in self.data.iter_mut() {
            *v = T::from_f64(dist.sample(rng));
        }
        Ok(())
    }

    /// Overwrite every element with a draw from `U[low, high)`.
    pub fn fill_uniform<R: Rng + ?Sized>(
        &mut self,
        low: f64,
        high: f64,
        rng: &mut R,
    ) -> TensorResult<()> {
        if !(low < high) {
            return Err(TensorError::InvalidOperation(format!(
                "uniform: empty range [{}, {})",
                low, high
            )));
        }
        let dist = Uniform::new(low, high);
        for v in self.data.iter_mut() {
            *v = T::from_f64(dist.sample(rng));
        }
        Ok(())
    }

    // ─── Shape Manipulation ─────────────────────────────────────────────────

    /// Reshape without copying the data.
    pub fn into_shape(self, new_shape: Vec<usize>) -> TensorResult<Tensor<T>> {
        let ns = Shape::new(new_shape);
        if self.numel() != ns.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: ns.to_vec(),
                got: self.shape_vec(),
            });
        }
        Ok(Tensor {
            data: self.data,
            shape: ns,
        })
    }

    /// Collapse everything after the leading axis: `[n, ...] -> [n, rest]`.
    pub fn flatten_batch(self) -> TensorResult<Tensor<T>> {
        let batch = self.shape.dim(0)?;
        let rest: usize = self.dims()[1..].iter().product();
        self.into_shape(vec![batch, rest])
    }

    /// Sub-tensor at `index` along the leading axis (the leading axis is dropped).
    pub fn select(&self, index: usize) -> TensorResult<Tensor<T>> {
        let mut t = self.narrow(index, 1)?;
        t.shape = Shape::from_slice(&self.dims()[1..]);
        Ok(t)
    }

    /// `len` consecutive entries of the leading axis starting at `start`.
    pub fn narrow(&self, start: usize, len: usize) -> TensorResult<Tensor<T>> {
        let size = self.shape.dim(0)?;
        if start + len > size {
            return Err(TensorError::IndexOutOfBounds {
                index: start + len,
                axis: 0,
                size,
            });
        }
        let inner: usize = self.dims()[1..].iter().product();
        let mut dims = self.shape_vec();
        dims[0] = len;
        Ok(Tensor {
            data: self.data[start * inner..(start + len) * inner].to_vec(),
            shape: Shape::new(dims),
        })
    }

    /// Stack equally shaped tensors along a new leading axis.
    pub fn stack(tensors: &[&Tensor<T>]) -> TensorResult<Tensor<T>> {
        let first = tensors.first().ok_or(TensorError::EmptyTensor)?;
        let mut data = Vec::with_capacity(first.numel() * tensors.len());
        for t in tensors {
            if t.shape != first.shape {
                return Err(TensorError::ShapeMismatch {
                    expected: first.shape_vec(),
                    got: t.shape_vec(),
                });
            }
            data.extend_from_slice(&t.data);
        }
        let mut dims = vec![tensors.len()];
        dims.extend_from_slice(first.dims());
        Tensor::new(data, dims)
    }

    // ─── Element-wise Operations ────────────────────────────────────────────

    pub fn apply_mut<F: Fn(T) -> T>(&mut self, f: F) {
        for x in self.data.iter_mut() {
            *x = f(*x);
        }
    }

    pub fn relu_mut(&mut self) {
        self.apply_mut(|x| if x > T::ZERO { x } else { T::ZERO })
    }

    /// In-place `self += other`; shapes must be identical.
    pub fn add_mut(&mut self, other: &Tensor<T>) -> TensorResult<()> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_vec(),
                got: other.shape_vec(),
            });
        }
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    // ─── Reductions ─────────────────────────────────────────────────────────

    /// Sum of all elements, accumulated in `f64`.
    pub fn sum_all(&self) -> f64 {
        self.data.iter().map(|v| v.to_f64()).sum()
    }

    /// Mean of all elements.
    pub fn mean_all(&self) -> TensorResult<f64> {
        if self.data.is_empty() {
            return Err(TensorError::EmptyTensor);
        }
        Ok(self.sum_all() / self.numel() as f64)
    }

    /// Population variance of all elements.
    pub fn var_all(&self) -> TensorResult<f64> {
        let mean = self.mean_all()?;
        let sq: f64 = self
            .data
            .iter()
            .map(|v| {
                let d = v.to_f64() - mean;
                d * d
            })
            .sum();
        Ok(sq / self.numel() as f64)
    }

    pub fn max_all(&self) -> TensorResult<T> {
        self.data
            .iter()
            .copied()
            .reduce(T::max)
            .ok_or(TensorError::EmptyTensor)
    }

    pub fn min_all(&self) -> TensorResult<T> {
        self.data
            .iter()
            .copied()
            .reduce(T::min)
            .ok_or(TensorError::EmptyTensor)
    }

    /// Index of the largest entry in each row of a 2-D tensor.
    pub fn argmax_rows(&self) -> TensorResult<Vec<usize>> {
        if self.ndim() != 2 {
            return Err(TensorError::DimensionMismatch(format!(
                "argmax_rows expects a 2-D tensor, got shape {}",
                self.shape
            )));
        }
        let cols = self.dims()[1];
        if cols == 0 {
            return Err(TensorError::EmptyTensor);
        }
        Ok(self
            .data
            .chunks_exact(cols)
            .map(|row| {
                let mut best = 0;
                for (i, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = i;
                    }
                }
                best
            })
            .collect())
    }

    // ─── Matrix Multiply ────────────────────────────────────────────────────

    /// 2-D matrix product `[m, k] · [k, n] -> [m, n]`.
    pub fn matmul(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        if self.ndim() != 2 || other.ndim() != 2 {
            return Err(TensorError::InvalidOperation(format!(
                "matmul requires 2-D tensors, got {} and {}",
                self.shape, other.shape
            )));
        }
        let (m, k) = (self.dims()[0], self.dims()[1]);
        let (k2, n) = (other.dims()[0], other.dims()[1]);
        if k != k2 {
            return Err(TensorError::DimensionMismatch(format!(
                "matmul: inner dimensions must match, got {} and {}",
                k, k2
            )));
        }
        let mut data = vec![T::ZERO; m * n];
        ops::gemm(m, k, n, &self.data, &other.data, &mut data)?;
        Tensor::new(data, vec![m, n])
    }
}

impl<T: Float> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

// ─── Display ────────────────────────────────────────────────────────────────

impl<T: Float> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ndim() == 1 || (self.ndim() == 2 && self.dims()[0] == 1) {
            write!(f, "tensor([")?;
            for (i, v) in self.data.iter().take(8).enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:.4}", v)?;
            }
            if self.numel() > 8 {
                write!(f, ", ...")?;
            }
            return write!(f, "], shape={})", self.shape);
        }
        write!(f, "tensor(shape={}, numel={})", self.shape, self.numel())
    }
}
