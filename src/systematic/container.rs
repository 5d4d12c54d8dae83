//! The systematic container.
//!
//! A `Systematic<T>` holds every alternate universe of one uncertainty source.
//! The element type is uniform (all measurements, or all histograms) and the
//! number of universes is fixed by its [`SystType`]. Transformations never
//! mutate in place: they build a new container with the same name, kind and
//! universe order.

use rayon::prelude::*;

use crate::domain::SystType;
use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::measurement::Measurement;

#[derive(Debug, Clone, PartialEq)]
pub struct Systematic<T> {
    name: String,
    kind: SystType,
    universes: Vec<T>,
}

impl<T> Systematic<T> {
    /// Build a systematic, checking the universe count against `kind`.
    pub fn new(name: impl Into<String>, kind: SystType, universes: Vec<T>) -> Result<Self> {
        let name = name.into();
        if !kind.accepts(universes.len()) {
            return Err(XsecError::Cardinality {
                name,
                kind,
                expected: kind.cardinality(),
                got: universes.len(),
            });
        }
        Ok(Self {
            name,
            kind,
            universes,
        })
    }

    pub fn one_sided(name: impl Into<String>, shift: T) -> Self {
        Self {
            name: name.into(),
            kind: SystType::OneSided,
            universes: vec![shift],
        }
    }

    pub fn two_sided(name: impl Into<String>, up: T, down: T) -> Self {
        Self {
            name: name.into(),
            kind: SystType::TwoSided,
            universes: vec![up, down],
        }
    }

    pub fn multiverse(name: impl Into<String>, universes: Vec<T>) -> Result<Self> {
        Self::new(name, SystType::Multiverse, universes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SystType {
        self.kind
    }

    pub fn universes(&self) -> &[T] {
        &self.universes
    }

    pub fn len(&self) -> usize {
        self.universes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universes.is_empty()
    }

    pub fn into_universes(self) -> Vec<T> {
        self.universes
    }

    /// The upward shift. A one-sided systematic returns its only shift.
    pub fn up(&self) -> Result<&T> {
        match self.kind {
            SystType::OneSided | SystType::TwoSided => Ok(&self.universes[0]),
            SystType::Multiverse => Err(self.type_error("up", "OneSided or TwoSided")),
        }
    }

    /// The downward shift. A one-sided systematic returns its only shift.
    pub fn down(&self) -> Result<&T> {
        match self.kind {
            SystType::OneSided => Ok(&self.universes[0]),
            SystType::TwoSided => Ok(&self.universes[1]),
            SystType::Multiverse => Err(self.type_error("down", "OneSided or TwoSided")),
        }
    }

    /// Apply `f` to every universe, keeping name, kind and order.
    pub fn invoke<U, F>(&self, f: F) -> Result<Systematic<U>>
    where
        F: Fn(&T) -> U,
    {
        self.try_invoke(|u| Ok(f(u)))
    }

    /// Fallible [`invoke`](Self::invoke); the first failing universe aborts.
    pub fn try_invoke<U, F>(&self, f: F) -> Result<Systematic<U>>
    where
        F: Fn(&T) -> Result<U>,
    {
        self.ensure_not_empty()?;
        let universes = self.universes.iter().map(f).collect::<Result<Vec<U>>>()?;
        Ok(self.reshaped(universes))
    }

    /// Parallel [`try_invoke`](Self::try_invoke).
    ///
    /// Universes are evaluated concurrently; the output keeps input order.
    pub fn par_try_invoke<U, F>(&self, f: F) -> Result<Systematic<U>>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U> + Sync + Send,
    {
        self.ensure_not_empty()?;
        let universes = self
            .universes
            .par_iter()
            .map(f)
            .collect::<Result<Vec<U>>>()?;
        Ok(self.reshaped(universes))
    }

    pub(crate) fn type_error(&self, op: &'static str, expected: &'static str) -> XsecError {
        XsecError::SystematicType {
            op,
            name: self.name.clone(),
            expected,
            got: self.kind,
        }
    }

    fn ensure_not_empty(&self) -> Result<()> {
        if self.universes.is_empty() {
            Err(XsecError::Arity(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn reshaped<U>(&self, universes: Vec<U>) -> Systematic<U> {
        Systematic {
            name: self.name.clone(),
            kind: self.kind,
            universes,
        }
    }
}

impl<T> Systematic<T>
where
    T: Measurement,
{
    /// Evaluate every universe against the same data.
    pub fn eval(&self, data: &Histogram) -> Result<Systematic<Histogram>> {
        tracing::debug!(
            systematic = %self.name,
            kind = %self.kind,
            universes = self.universes.len(),
            "evaluating systematic"
        );
        self.par_try_invoke(|m| m.eval(data))
    }
}
