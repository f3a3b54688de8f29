//! Data-parallel helpers for the per-contact and per-column loops.
//!
//! Every helper takes a `parallel` switch; with the switch off (or the
//! `parallel` feature disabled) the work runs serially in index order.

use nalgebra::DVector;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maps `0..len` through `f`, keeping index order in the output.
#[cfg(feature = "parallel")]
pub fn map_range<T, F>(len: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}

#[cfg(not(feature = "parallel"))]
pub fn map_range<T, F>(len: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let _ = parallel;
    (0..len).map(f).collect()
}

/// Sums the contributions of `len` items into a vector of `out_len` entries.
///
/// Items may write to the same entries, e.g. two contacts on one body. In
/// parallel each worker folds into a private buffer and the buffers are
/// reduced, so no contribution is lost.
#[cfg(feature = "parallel")]
pub fn scatter_add<F>(len: usize, out_len: usize, parallel: bool, f: F) -> DVector<f64>
where
    F: Fn(usize, &mut DVector<f64>) + Sync + Send,
{
    if parallel {
        (0..len)
            .into_par_iter()
            .fold(
                || DVector::zeros(out_len),
                |mut acc, index| {
                    f(index, &mut acc);
                    acc
                },
            )
            .reduce(|| DVector::zeros(out_len), |a, b| a + b)
    } else {
        let mut acc = DVector::zeros(out_len);
        for index in 0..len {
            f(index, &mut acc);
        }
        acc
    }
}

#[cfg(not(feature = "parallel"))]
pub fn scatter_add<F>(len: usize, out_len: usize, parallel: bool, f: F) -> DVector<f64>
where
    F: Fn(usize, &mut DVector<f64>) + Sync + Send,
{
    let _ = parallel;
    let mut acc = DVector::zeros(out_len);
    for index in 0..len {
        f(index, &mut acc);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_entries_keep_every_contribution() {
        for parallel in [false, true] {
            let sums = scatter_add(1000, 2, parallel, |index, acc| {
                acc[index % 2] += 1.0;
            });
            assert_eq!(sums[0], 500.0);
            assert_eq!(sums[1], 500.0);
        }
    }

    #[test]
    fn map_range_preserves_order() {
        let squares = map_range(64, true, |i| i * i);
        assert_eq!(squares[7], 49);
        assert_eq!(squares.len(), 64);
    }
}
