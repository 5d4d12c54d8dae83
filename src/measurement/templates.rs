//! Template-based signal estimation.
//!
//! A [`TemplateSet`] holds labelled signal and background shape predictions,
//! signal always first. The [`TemplateSignalEstimator`] subtracts the summed
//! backgrounds from data, and exposes its templates so the template fit can
//! refit their normalizations.

use std::collections::BTreeMap;

use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::io::Group;
use crate::measurement::SignalEstimator;

/// Labelled templates, index 0 is the signal.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    labels: Vec<String>,
    templates: Vec<Histogram>,
}

impl TemplateSet {
    /// Build from a signal and any number of backgrounds (all with equal binning).
    pub fn new(
        signal: (String, Histogram),
        backgrounds: impl IntoIterator<Item = (String, Histogram)>,
    ) -> Result<Self> {
        let mut labels = vec![signal.0];
        let mut templates = vec![signal.1];
        for (label, h) in backgrounds {
            templates[0].check_binning(&h)?;
            if labels.contains(&label) {
                return Err(XsecError::DuplicateName(label));
            }
            labels.push(label);
            templates.push(h);
        }
        Ok(Self { labels, templates })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn templates(&self) -> &[Histogram] {
        &self.templates
    }

    pub fn signal(&self) -> &Histogram {
        &self.templates[0]
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

/// Signal = data minus the sum of fixed background templates.
#[derive(Debug, Clone)]
pub struct TemplateSignalEstimator {
    signal: Histogram,
    backgrounds: BTreeMap<String, Histogram>,
}

impl TemplateSignalEstimator {
    pub const TYPE_TAG: &'static str = "TemplateSignalEstimator";

    /// Label of the signal template.
    pub const SIGNAL_LABEL: &'static str = "signal";

    /// Backgrounds must share the signal binning and may not use the signal
    /// label.
    pub fn new(signal: Histogram, backgrounds: BTreeMap<String, Histogram>) -> Result<Self> {
        if backgrounds.contains_key(Self::SIGNAL_LABEL) {
            return Err(XsecError::DuplicateName(Self::SIGNAL_LABEL.to_string()));
        }
        for h in backgrounds.values() {
            signal.check_binning(h)?;
        }
        Ok(Self {
            signal,
            backgrounds,
        })
    }

    pub fn signal_template(&self) -> &Histogram {
        &self.signal
    }

    pub fn backgrounds(&self) -> &BTreeMap<String, Histogram> {
        &self.backgrounds
    }

    pub fn load(group: &Group) -> Result<Self> {
        group.expect_type(Self::TYPE_TAG)?;
        let signal = group.hist("signal")?;
        let bkg_group = group.group("backgrounds")?;
        let backgrounds = bkg_group
            .group_names()
            .into_iter()
            .map(|label| Ok((label.to_string(), bkg_group.group(label)?.hist("template")?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Self::new(signal, backgrounds)
    }
}

impl SignalEstimator for TemplateSignalEstimator {
    fn eval(&self, data: &Histogram) -> Result<Histogram> {
        data.sub_hist(&self.background(data)?)
    }

    fn background(&self, data: &Histogram) -> Result<Histogram> {
        let mut total = data.constant_like(0.0);
        for h in self.backgrounds.values() {
            total = total.add_hist(h)?;
        }
        Ok(total)
    }

    fn templates(&self) -> Option<TemplateSet> {
        // labels and binning were validated in `new`
        TemplateSet::new(
            (Self::SIGNAL_LABEL.to_string(), self.signal.clone()),
            self.backgrounds.iter().map(|(k, v)| (k.clone(), v.clone())),
        )
        .ok()
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(crate::io::TYPE_KEY, Self::TYPE_TAG);
        g.put_hist("signal", &self.signal);
        let bkg = g.mkdir("backgrounds");
        for (label, h) in &self.backgrounds {
            bkg.mkdir(label).put_hist("template", h);
        }
        Ok(())
    }
}
