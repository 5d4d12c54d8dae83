//! Reconstruct built-in measurements from persisted groups.
//!
//! Each function dispatches on the group's type tag. User-defined types are
//! not known here; callers wrap [`load_builtin`] in their own loader and
//! handle their tags first.

use std::sync::Arc;

use crate::error::{Result, XsecError};
use crate::io::Group;
use crate::measurement::{
    CrossSection, CrossSectionRatio, Efficiency, Flux, IdentityUnfold, IntegratedFlux,
    MatrixUnfold, Measurement, SignalEstimator, SignalOnly, SimpleEfficiency, SimpleFlux,
    SimpleSignalEstimator, TemplateSignalEstimator, Unfold,
};

fn tag_of(group: &Group) -> Result<&str> {
    group
        .type_tag()
        .ok_or_else(|| XsecError::Persistence("group has no type tag".into()))
}

fn unknown(what: &str, tag: &str) -> XsecError {
    XsecError::Persistence(format!("unknown {what} type '{tag}'"))
}

/// Load any built-in measurement stored under `parent/name`.
pub fn load_builtin(parent: &Group, name: &str) -> Result<Arc<dyn Measurement>> {
    let group = parent.group(name)?;
    match tag_of(group)? {
        CrossSection::TYPE_TAG => Ok(Arc::new(CrossSection::load(group)?)),
        CrossSectionRatio::TYPE_TAG => Ok(Arc::new(CrossSectionRatio::load(group)?)),
        SignalOnly::TYPE_TAG => Ok(Arc::new(SignalOnly::load(group)?)),
        tag => Err(unknown("measurement", tag)),
    }
}

pub fn load_efficiency(group: &Group) -> Result<Arc<dyn Efficiency>> {
    match tag_of(group)? {
        SimpleEfficiency::TYPE_TAG => Ok(Arc::new(SimpleEfficiency::load(group)?)),
        tag => Err(unknown("efficiency", tag)),
    }
}

pub fn load_flux(group: &Group) -> Result<Arc<dyn Flux>> {
    match tag_of(group)? {
        SimpleFlux::TYPE_TAG => Ok(Arc::new(SimpleFlux::load(group)?)),
        IntegratedFlux::TYPE_TAG => Ok(Arc::new(IntegratedFlux::load(group)?)),
        tag => Err(unknown("flux", tag)),
    }
}

pub fn load_unfold(group: &Group) -> Result<Arc<dyn Unfold>> {
    match tag_of(group)? {
        IdentityUnfold::TYPE_TAG => Ok(Arc::new(IdentityUnfold)),
        MatrixUnfold::TYPE_TAG => Ok(Arc::new(MatrixUnfold::load(group)?)),
        tag => Err(unknown("unfold", tag)),
    }
}

pub fn load_signal_estimator(group: &Group) -> Result<Arc<dyn SignalEstimator>> {
    match tag_of(group)? {
        SimpleSignalEstimator::TYPE_TAG => Ok(Arc::new(SimpleSignalEstimator::load(group)?)),
        TemplateSignalEstimator::TYPE_TAG => Ok(Arc::new(TemplateSignalEstimator::load(group)?)),
        tag => Err(unknown("signal estimator", tag)),
    }
}
