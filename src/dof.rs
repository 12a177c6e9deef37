/*!
# Degrees of freedom.

A [`Dof`] maps the masked entries of a `sources × components` block to a flat vector and back.
Masked entries are visited in row-major order, so the flat index of source `s`, component `c`
only depends on the mask.

```rust
use ndarray::{array, Array1};
use ptsrc_mcmc::dof::Dof;

let dof = Dof::new(array![[true, false], [false, true]]);
assert_eq!(dof.n(), 2);

let x = array![[1.0, 2.0], [3.0, 4.0]];
let flat = dof.zip(x.view()).unwrap();
assert_eq!(flat, Array1::from(vec![1.0, 4.0]));
assert_eq!(dof.unzip(flat.view()).unwrap(), array![[1.0, 0.0], [0.0, 4.0]]);
```
*/

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Result, SamplerError};

/// Immutable masked view over a structured amplitude block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dof {
    mask: Array2<bool>,
    n: usize,
}

impl Dof {
    pub fn new(mask: Array2<bool>) -> Self {
        let n = mask.iter().filter(|&&m| m).count();
        Self { mask, n }
    }

    /// A mask selecting every entry of a `shape` block.
    pub fn full(shape: (usize, usize)) -> Self {
        Self::new(Array2::from_elem(shape, true))
    }

    /// Number of masked entries.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Gathers the masked entries of `x`.
    pub fn zip(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if x.dim() != self.mask.dim() {
            return Err(SamplerError::ShapeMismatch {
                what: "Dof::zip",
                expected: self.mask.len(),
                got: x.len(),
            });
        }
        let flat: Vec<f64> = self
            .mask
            .iter()
            .zip(x.iter())
            .filter_map(|(&m, &v)| m.then_some(v))
            .collect();
        Ok(Array1::from(flat))
    }

    /// Scatters `flat` into a zero-initialised block of the mask's shape.
    pub fn unzip(&self, flat: ArrayView1<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros(self.mask.dim());
        self.unzip_into(flat, &mut out)?;
        Ok(out)
    }

    /// Scatters `flat` into the masked entries of `out`, leaving the rest untouched.
    pub fn unzip_into(&self, flat: ArrayView1<f64>, out: &mut Array2<f64>) -> Result<()> {
        if flat.len() != self.n {
            return Err(SamplerError::ShapeMismatch {
                what: "Dof::unzip",
                expected: self.n,
                got: flat.len(),
            });
        }
        if out.dim() != self.mask.dim() {
            return Err(SamplerError::ShapeMismatch {
                what: "Dof::unzip_into",
                expected: self.mask.len(),
                got: out.len(),
            });
        }
        let masked = self.mask.indexed_iter().filter(|(_, m)| **m);
        for ((idx, _), &v) in masked.zip(flat.iter()) {
            out[idx] = v;
        }
        Ok(())
    }

    /// Flat index of every masked entry, `None` where the mask is false.
    pub fn index_map(&self) -> Array2<Option<usize>> {
        let mut out = Array2::from_elem(self.mask.dim(), None);
        for (flat, (idx, _)) in self.mask.indexed_iter().filter(|(_, m)| **m).enumerate() {
            out[idx] = Some(flat);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_zip_unzip_inverse_random_masks() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..50 {
            let (n, c) = (rng.random_range(1..6), rng.random_range(1..4));
            let mask = Array::from_shape_fn((n, c), |_| rng.random_bool(0.5));
            let dof = Dof::new(mask.clone());

            let v = Array1::from_shape_fn(dof.n(), |_| rng.random::<f64>());
            let back = dof.zip(dof.unzip(v.view()).unwrap().view()).unwrap();
            assert_eq!(back, v);

            let x = Array2::from_shape_fn((n, c), |_| rng.random::<f64>() + 1.0);
            let y = dof.unzip(dof.zip(x.view()).unwrap().view()).unwrap();
            for ((&m, &xv), &yv) in mask.iter().zip(x.iter()).zip(y.iter()) {
                if m {
                    assert_eq!(xv, yv);
                } else {
                    assert_eq!(yv, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_unzip_length_mismatch() {
        let dof = Dof::new(array![[true, true], [false, true]]);
        let err = dof.unzip(array![1.0, 2.0].view()).unwrap_err();
        assert!(matches!(
            err,
            SamplerError::ShapeMismatch {
                expected: 3,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_zip_shape_mismatch() {
        let dof = Dof::new(array![[true], [true]]);
        assert!(dof.zip(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_unzip_into_keeps_unmasked_entries() {
        let dof = Dof::new(array![[true, false], [false, true]]);
        let mut out = array![[9.0, 9.0], [9.0, 9.0]];
        dof.unzip_into(array![1.0, 2.0].view(), &mut out).unwrap();
        assert_eq!(out, array![[1.0, 9.0], [9.0, 2.0]]);
    }

    #[test]
    fn test_empty_mask() {
        let dof = Dof::new(Array2::from_elem((3, 1), false));
        assert_eq!(dof.n(), 0);
        assert_eq!(dof.unzip(Array1::zeros(0).view()).unwrap(), Array2::<f64>::zeros((3, 1)));
    }

    #[test]
    fn test_index_map_row_major() {
        let dof = Dof::new(array![[true, true], [false, true]]);
        assert_eq!(
            dof.index_map(),
            array![[Some(0), Some(1)], [None, Some(2)]]
        );
    }
}
