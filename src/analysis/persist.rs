//! Saving and loading analyses.
//!
//! Layout under the analysis group:
//!
//! ```text
//! type         "Analysis"
//! data         histogram
//! nominal/     measurement group
//! systematics/
//!   <name>/
//!     name       text
//!     kind       "onesided" | "twosided" | "multiverse"
//!     nshifts    scalar
//!     universes/
//!       0/ 1/ ...  measurement groups
//! ```

use std::sync::Arc;

use crate::analysis::Analysis;
use crate::domain::SystType;
use crate::error::{Result, XsecError};
use crate::io::{Group, TYPE_KEY};
use crate::measurement::Measurement;
use crate::systematic::Systematic;

pub const ANALYSIS_TAG: &str = "Analysis";

impl Analysis {
    /// Persist into the sub-group `name` of `group`.
    pub fn save_to(&self, group: &mut Group, name: &str) -> Result<()> {
        let g = group.mkdir(name);
        g.put_text(TYPE_KEY, ANALYSIS_TAG);
        g.put_hist("data", self.data());
        self.nominal().save_to(g, "nominal")?;

        let systs = g.mkdir("systematics");
        for (name, syst) in self.systematics() {
            let sg = systs.mkdir(name);
            sg.put_text("name", syst.name());
            sg.put_text("kind", syst.kind().tag());
            sg.put_scalar("nshifts", syst.len() as f64);
            let universes = sg.mkdir("universes");
            for (i, m) in syst.universes().iter().enumerate() {
                m.save_to(universes, &i.to_string())?;
            }
        }
        tracing::debug!(group = name, systematics = self.systematics().len(), "saved analysis");
        Ok(())
    }

    /// Reconstruct an analysis saved under `group/name`.
    ///
    /// `loader` rebuilds a measurement from `(parent, sub-group name)`;
    /// [`load_builtin`](crate::measurement::load_builtin) covers the built-in
    /// types.
    pub fn load_from<F>(group: &Group, name: &str, loader: F) -> Result<Analysis>
    where
        F: Fn(&Group, &str) -> Result<Arc<dyn Measurement>>,
    {
        let g = group.group(name)?;
        g.expect_type(ANALYSIS_TAG)?;
        let data = g.hist("data")?;
        let nominal = loader(g, "nominal")?;

        let mut ana = Analysis::new(nominal, data);
        let systs = g.group("systematics")?;
        for key in systs.group_names() {
            let sg = systs.group(key)?;
            let kind_tag = sg.text("kind")?;
            let kind = SystType::from_tag(kind_tag).ok_or_else(|| {
                XsecError::Persistence(format!("systematic '{key}': unknown kind '{kind_tag}'"))
            })?;
            let nshifts = sg.scalar("nshifts")?;
            if !(nshifts >= 0.0 && nshifts.fract() == 0.0) {
                return Err(XsecError::Persistence(format!(
                    "systematic '{key}': invalid nshifts {nshifts}"
                )));
            }
            let universes_group = sg.group("universes")?;
            let universes = (0..nshifts as usize)
                .map(|i| loader(universes_group, &i.to_string()))
                .collect::<Result<Vec<_>>>()?;
            ana.add_systematic(Systematic::new(sg.text("name")?, kind, universes)?)?;
        }
        tracing::debug!(group = name, systematics = ana.systematics().len(), "loaded analysis");
        Ok(ana)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist::Histogram;
    use crate::io::{read_store, write_store};
    use crate::measurement::{SignalOnly, SimpleSignalEstimator, load_builtin};

    fn h(values: &[f64]) -> Histogram {
        let edges = (0..=values.len()).map(|i| i as f64).collect();
        Histogram::from_counts(edges, values.to_vec()).unwrap()
    }

    fn bkg(values: &[f64]) -> Arc<dyn Measurement> {
        Arc::new(SignalOnly::new(Arc::new(SimpleSignalEstimator::new(h(values)))))
    }

    #[test]
    fn round_trip_preserves_everything() {
        let mut ana = Analysis::new(bkg(&[1.0, 2.0]), h(&[50.0, 60.0]));
        ana.add_systematic(Systematic::one_sided("light", bkg(&[1.5, 2.5]))).unwrap();
        ana.add_systematic(
            Systematic::multiverse(
                "genie",
                (0..5).map(|i| bkg(&[i as f64, 2.0 * i as f64])).collect(),
            )
            .unwrap(),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ana.json");
        let mut root = Group::new();
        ana.save_to(&mut root, "numu").unwrap();
        write_store(&path, &root).unwrap();

        let back = Analysis::load_from(&read_store(&path).unwrap(), "numu", load_builtin).unwrap();
        assert_eq!(back.data(), ana.data());
        assert_eq!(back.systematic_names(), vec!["genie".to_string(), "light".to_string()]);
        assert_eq!(back.cross_section().unwrap(), ana.cross_section().unwrap());

        let genie = &back.systematics()["genie"];
        assert_eq!(genie.kind(), SystType::Multiverse);
        assert_eq!(genie.len(), 5);
        let orig = ana.shifted_cross_section("genie").unwrap();
        let loaded = back.shifted_cross_section("genie").unwrap();
        assert_eq!(orig, loaded);
        assert_eq!(back.systematics()["light"].kind(), SystType::OneSided);
    }

    #[test]
    fn wrong_type_tag_is_rejected() {
        let mut root = Group::new();
        root.mkdir("thing").put_text(TYPE_KEY, "CrossSection");
        let err = Analysis::load_from(&root, "thing", load_builtin).unwrap_err();
        assert!(matches!(err, XsecError::Persistence(_)));
    }

    #[test]
    fn corrupted_cardinality_is_rejected() {
        let mut ana = Analysis::new(bkg(&[1.0]), h(&[5.0]));
        ana.add_systematic(Systematic::two_sided("cal", bkg(&[0.0]), bkg(&[2.0]))).unwrap();
        let mut root = Group::new();
        ana.save_to(&mut root, "a").unwrap();

        // rewrite the kind so two universes claim to be one-sided
        let mut tampered = root.clone();
        let mut a = tampered.group("a").unwrap().clone();
        let mut systs = a.group("systematics").unwrap().clone();
        let mut cal = systs.group("cal").unwrap().clone();
        cal.put_text("kind", "onesided");
        systs.insert_group("cal", cal);
        a.insert_group("systematics", systs);
        tampered.insert_group("a", a);

        let err = Analysis::load_from(&tampered, "a", load_builtin).unwrap_err();
        assert!(matches!(err, XsecError::Cardinality { .. }));
    }
}
