use rayon::prelude::*;

use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};

/// Below this many multiply-adds a product runs on the calling thread.
const PARALLEL_MIN_WORK: usize = 1 << 16;

/// Accumulating matrix product `c += a · b` over row-major slices,
/// `a: [m, k]`, `b: [k, n]`, `c: [m, n]`.
///
/// Rows of `c` are independent, so large products are split across the rayon
/// pool one output row per task. Each row is summed in the same order either
/// way, so the result does not depend on the thread count.
pub fn gemm<T: Float>(
    m: usize,
    k: usize,
    n: usize,
    a: &[T],
    b: &[T],
    c: &mut [T],
) -> TensorResult<()> {
    if a.len() != m * k || b.len() != k * n || c.len() != m * n {
        return Err(TensorError::DimensionMismatch(format!(
            "gemm: [{}x{}]·[{}x{}] -> [{}x{}] given buffers of {}, {} and {} elements",
            m,
            k,
            k,
            n,
            m,
            n,
            a.len(),
            b.len(),
            c.len()
        )));
    }
    if m == 0 || n == 0 {
        return Ok(());
    }

    if m * k * n >= PARALLEL_MIN_WORK {
        c.par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, c_row)| accumulate_row(&a[i * k..(i + 1) * k], b, n, c_row));
    } else {
        c.chunks_mut(n)
            .enumerate()
            .for_each(|(i, c_row)| accumulate_row(&a[i * k..(i + 1) * k], b, n, c_row));
    }
    Ok(())
}

#[inline]
fn accumulate_row<T: Float>(a_row: &[T], b: &[T], n: usize, c_row: &mut [T]) {
    for (&av, b_row) in a_row.iter().zip(b.chunks_exact(n)) {
        for (cv, &bv) in c_row.iter_mut().zip(b_row) {
            *cv += av * bv;
        }
    }
}
