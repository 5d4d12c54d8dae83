//! Binned histogram with per-bin variance.
//!
//! Every histogram carries:
//!
//! - bin edges (`nbins + 1`, strictly increasing)
//! - bin contents
//! - bin variances (sum of squared weights, `>= 0`; NaN only where a division
//!   by zero left the bin undefined)
//! - an exposure (integrated beam normalization, `1.0` unless stated)
//!
//! Arithmetic between two histograms requires identical binning and propagates
//! variances with the usual first-order formulas, treating the operands as
//! statistically independent.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XsecError};

/// Relative tolerance used when comparing bin edges.
const EDGE_TOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HistogramRepr", into = "HistogramRepr")]
pub struct Histogram {
    edges: Vec<f64>,
    contents: Vec<f64>,
    variances: Vec<f64>,
    exposure: f64,
}

/// On-disk representation; validated on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistogramRepr {
    edges: Vec<f64>,
    contents: Vec<f64>,
    variances: Vec<f64>,
    #[serde(default = "default_exposure")]
    exposure: f64,
}

fn default_exposure() -> f64 {
    1.0
}

impl TryFrom<HistogramRepr> for Histogram {
    type Error = XsecError;

    fn try_from(repr: HistogramRepr) -> Result<Self> {
        Histogram::new(repr.edges, repr.contents, repr.variances)?.with_exposure(repr.exposure)
    }
}

impl From<Histogram> for HistogramRepr {
    fn from(h: Histogram) -> Self {
        HistogramRepr {
            edges: h.edges,
            contents: h.contents,
            variances: h.variances,
            exposure: h.exposure,
        }
    }
}

impl Histogram {
    /// Build a histogram from explicit edges, contents and variances.
    pub fn new(edges: Vec<f64>, contents: Vec<f64>, variances: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(XsecError::InvalidHistogram(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(XsecError::InvalidHistogram(
                "edges must be finite and strictly increasing".into(),
            ));
        }
        let nbins = edges.len() - 1;
        if contents.len() != nbins || variances.len() != nbins {
            return Err(XsecError::InvalidHistogram(format!(
                "{nbins} bins but {} contents and {} variances",
                contents.len(),
                variances.len()
            )));
        }
        if let Some(i) = variances.iter().position(|v| !(*v >= 0.0)) {
            return Err(XsecError::InvalidHistogram(format!(
                "variance {} in bin {i} is negative or NaN",
                variances[i]
            )));
        }
        if let Some(i) = contents.iter().position(|c| c.is_nan()) {
            return Err(XsecError::InvalidHistogram(format!("NaN content in bin {i}")));
        }

        Ok(Self {
            edges,
            contents,
            variances,
            exposure: 1.0,
        })
    }

    /// Contents with zero variance.
    pub fn from_contents(edges: Vec<f64>, contents: Vec<f64>) -> Result<Self> {
        let variances = vec![0.0; contents.len()];
        Self::new(edges, contents, variances)
    }

    /// Unit-weight counts: the variance of each bin equals its content.
    pub fn from_counts(edges: Vec<f64>, counts: Vec<f64>) -> Result<Self> {
        let variances = counts.iter().map(|c| c.abs()).collect();
        Self::new(edges, counts, variances)
    }

    /// `nbins` equal-width empty bins over `[min, max]`.
    pub fn uniform(nbins: usize, min: f64, max: f64) -> Result<Self> {
        if nbins == 0 {
            return Err(XsecError::InvalidHistogram("need at least one bin".into()));
        }
        let width = (max - min) / nbins as f64;
        let edges = (0..=nbins).map(|i| min + width * i as f64).collect();
        Self::new(edges, vec![0.0; nbins], vec![0.0; nbins])
    }

    /// A histogram with the same binning and exposure, every bin set to `value`.
    pub fn constant_like(&self, value: f64) -> Self {
        Self {
            edges: self.edges.clone(),
            contents: vec![value; self.nbins()],
            variances: vec![0.0; self.nbins()],
            exposure: self.exposure,
        }
    }

    /// Same binning and exposure, new contents and variances.
    ///
    /// Lengths must match `nbins()`; variances are clamped at zero.
    pub fn with_values(&self, contents: Vec<f64>, variances: Vec<f64>) -> Result<Self> {
        if contents.len() != self.nbins() || variances.len() != self.nbins() {
            return Err(XsecError::BinningMismatch(format!(
                "expected {} bins, got {} contents / {} variances",
                self.nbins(),
                contents.len(),
                variances.len()
            )));
        }
        Ok(Self {
            edges: self.edges.clone(),
            contents,
            variances: variances.into_iter().map(|v| v.max(0.0)).collect(),
            exposure: self.exposure,
        })
    }

    pub fn with_exposure(mut self, exposure: f64) -> Result<Self> {
        if !(exposure.is_finite() && exposure > 0.0) {
            return Err(XsecError::InvalidHistogram(format!(
                "exposure must be finite and > 0, got {exposure}"
            )));
        }
        self.exposure = exposure;
        Ok(self)
    }

    pub fn nbins(&self) -> usize {
        self.contents.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    pub fn exposure(&self) -> f64 {
        self.exposure
    }

    pub fn value(&self, bin: usize) -> f64 {
        self.contents[bin]
    }

    /// Standard deviation per bin.
    pub fn errors(&self) -> Vec<f64> {
        self.variances.iter().map(|v| v.sqrt()).collect()
    }

    pub fn bin_widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Whether both histograms have the same bin edges (relative tolerance `tol`).
    pub fn is_same_binning(&self, other: &Histogram, tol: f64) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0))
    }

    /// Fail with `BinningMismatch` unless `other` shares this binning.
    pub fn check_binning(&self, other: &Histogram) -> Result<()> {
        if self.is_same_binning(other, EDGE_TOL) {
            Ok(())
        } else {
            Err(XsecError::BinningMismatch(format!(
                "{} bins over [{}, {}] vs {} bins over [{}, {}]",
                self.nbins(),
                self.edges[0],
                self.edges[self.edges.len() - 1],
                other.nbins(),
                other.edges[0],
                other.edges[other.edges.len() - 1],
            )))
        }
    }

    /// Bin-wise equality of contents and variances within an absolute tolerance.
    pub fn approx_eq(&self, other: &Histogram, tol: f64) -> bool {
        self.is_same_binning(other, EDGE_TOL)
            && self
                .contents
                .iter()
                .zip(&other.contents)
                .all(|(a, b)| (a - b).abs() <= tol)
            && self
                .variances
                .iter()
                .zip(&other.variances)
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    /// `self + rhs`; variances add.
    pub fn add_hist(&self, rhs: &Histogram) -> Result<Histogram> {
        self.zip_with(rhs, |a, va, b, vb| (a + b, va + vb))
    }

    /// `self - rhs`; variances add.
    pub fn sub_hist(&self, rhs: &Histogram) -> Result<Histogram> {
        self.zip_with(rhs, |a, va, b, vb| (a - b, va + vb))
    }

    /// `self * rhs`; `σ² = b²σa² + a²σb²`.
    pub fn mul_hist(&self, rhs: &Histogram) -> Result<Histogram> {
        self.zip_with(rhs, |a, va, b, vb| (a * b, b * b * va + a * a * vb))
    }

    /// `self / rhs`; `σ² = σa²/b² + a²σb²/b⁴`.
    ///
    /// Zero denominators follow IEEE semantics (`inf`/`NaN`); callers that need
    /// another policy handle those bins themselves.
    pub fn div_hist(&self, rhs: &Histogram) -> Result<Histogram> {
        self.zip_with(rhs, |a, va, b, vb| {
            let r = a / b;
            let b2 = b * b;
            (r, va / b2 + a * a * vb / (b2 * b2))
        })
    }

    /// Multiply every bin by `c`; variances scale by `c²`.
    pub fn scale(&self, c: f64) -> Histogram {
        Histogram {
            edges: self.edges.clone(),
            contents: self.contents.iter().map(|v| v * c).collect(),
            variances: self.variances.iter().map(|v| v * c * c).collect(),
            exposure: self.exposure,
        }
    }

    /// Rescale to a new exposure.
    pub fn scale_by_exposure(&self, exposure: f64) -> Result<Histogram> {
        self.scale(exposure / self.exposure).with_exposure(exposure)
    }

    /// Divide every bin by its width.
    pub fn bin_width_normalize(&self) -> Histogram {
        let widths = self.bin_widths();
        Histogram {
            edges: self.edges.clone(),
            contents: self.contents.iter().zip(&widths).map(|(v, w)| v / w).collect(),
            variances: self
                .variances
                .iter()
                .zip(&widths)
                .map(|(v, w)| v / (w * w))
                .collect(),
            exposure: self.exposure,
        }
    }

    /// Absolute value per bin; variances unchanged.
    pub fn abs(&self) -> Histogram {
        Histogram {
            contents: self.contents.iter().map(|v| v.abs()).collect(),
            ..self.clone()
        }
    }

    /// Square root per bin; `σ² → σ² / (4x)`.
    pub fn sqrt(&self) -> Histogram {
        let contents: Vec<f64> = self.contents.iter().map(|v| v.sqrt()).collect();
        let variances = contents
            .iter()
            .zip(&self.variances)
            .map(|(s, v)| if *s > 0.0 { v / (4.0 * s * s) } else { 0.0 })
            .collect();
        Histogram {
            edges: self.edges.clone(),
            contents,
            variances,
            exposure: self.exposure,
        }
    }

    /// Same contents, zero variance.
    pub fn without_variance(&self) -> Histogram {
        Histogram {
            variances: vec![0.0; self.nbins()],
            ..self.clone()
        }
    }

    /// Accumulate a partial fill of the same selection into `self`.
    ///
    /// Contents, variances and exposures add, so merging any number of partial
    /// histograms in any order yields the same result.
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        self.check_binning(other)?;
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        for (a, b) in self.variances.iter_mut().zip(&other.variances) {
            *a += b;
        }
        self.exposure += other.exposure;
        Ok(())
    }

    fn zip_with<F>(&self, rhs: &Histogram, f: F) -> Result<Histogram>
    where
        F: Fn(f64, f64, f64, f64) -> (f64, f64),
    {
        self.check_binning(rhs)?;
        let n = self.nbins();
        let mut contents = Vec::with_capacity(n);
        let mut variances = Vec::with_capacity(n);
        for i in 0..n {
            let (c, v) = f(
                self.contents[i],
                self.variances[i],
                rhs.contents[i],
                rhs.variances[i],
            );
            contents.push(c);
            variances.push(if v.is_nan() { v } else { v.max(0.0) });
        }
        Ok(Histogram {
            edges: self.edges.clone(),
            contents,
            variances,
            exposure: self.exposure,
        })
    }
}
