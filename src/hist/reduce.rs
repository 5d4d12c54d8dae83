//! Merging partial fills produced by independent workers.
//!
//! Transport between workers lives outside this crate; by the time histograms
//! reach this layer they are plain values that only need to be summed.

use rayon::prelude::*;

use crate::error::{Result, XsecError};
use crate::hist::Histogram;

/// Merge partial histograms of the same selection into one.
///
/// The reduction runs in parallel and is order independent because
/// [`Histogram::merge`] is commutative and associative.
pub fn reduce_partials(parts: Vec<Histogram>) -> Result<Histogram> {
    parts
        .into_par_iter()
        .map(Ok)
        .reduce_with(|a: Result<Histogram>, b: Result<Histogram>| {
            let mut a = a?;
            a.merge(&b?)?;
            Ok(a)
        })
        .unwrap_or_else(|| Err(XsecError::InvalidHistogram("no partial histograms to reduce".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_many_partials() {
        let edges = vec![0.0, 1.0, 2.0];
        let parts: Vec<Histogram> = (0..64)
            .map(|i| Histogram::from_counts(edges.clone(), vec![1.0, i as f64]).unwrap())
            .collect();
        let total = reduce_partials(parts).unwrap();
        assert_eq!(total.contents(), &[64.0, (0..64).sum::<i32>() as f64]);
        assert_eq!(total.exposure(), 64.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(reduce_partials(Vec::new()).is_err());
    }

    #[test]
    fn mismatched_partial_fails() {
        let a = Histogram::from_counts(vec![0.0, 1.0, 2.0], vec![1.0, 1.0]).unwrap();
        let b = Histogram::from_counts(vec![0.0, 1.0], vec![1.0]).unwrap();
        assert!(matches!(
            reduce_partials(vec![a, b]),
            Err(XsecError::BinningMismatch(_))
        ));
    }
}
