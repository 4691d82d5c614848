use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::encoder::FeatType;
use crate::error::{Error, Result};
use crate::quark::Quark;

/// A trained feature: kind, source (attribute id for state features, label
/// id for transition features), destination label, learned weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub cat: FeatType,
    pub src: usize,
    pub dst: usize,
    pub weight: f64,
}

/// The trained artifact: feature weights plus the vocabulary needed to
/// encode new instances against the model.
///
/// Read-only once constructed. The reference lists mirror the feature
/// table: `attr_refs[a]` holds the state features fired by attribute #a,
/// `label_refs[i]` the transition features leaving label #i.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    labels: Quark,
    attrs: Quark,
    features: Vec<Feature>,
    attr_refs: Vec<Vec<usize>>,
    label_refs: Vec<Vec<usize>>,
}

impl TrainedModel {
    pub fn from_parts(labels: Quark, attrs: Quark, features: Vec<Feature>) -> Self {
        let mut attr_refs = vec![Vec::new(); attrs.len()];
        let mut label_refs = vec![Vec::new(); labels.len()];
        for (fid, f) in features.iter().enumerate() {
            match f.cat {
                FeatType::State => attr_refs[f.src].push(fid),
                FeatType::Trans => label_refs[f.src].push(fid),
            }
        }
        Self {
            labels,
            attrs,
            features,
            attr_refs,
            label_refs,
        }
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn num_attrs(&self) -> usize {
        self.attrs.len()
    }

    pub fn labels(&self) -> &Quark {
        &self.labels
    }

    pub fn attrs(&self) -> &Quark {
        &self.attrs
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub(crate) fn attr_ref(&self, aid: usize) -> &[usize] {
        &self.attr_refs[aid]
    }

    pub(crate) fn label_ref(&self, lid: usize) -> &[usize] {
        &self.label_refs[lid]
    }

    pub(crate) fn feature(&self, fid: usize) -> &Feature {
        &self.features[fid]
    }

    /// Serializes the full parameter/topology graph to `path`. Written
    /// exactly once per successful run, after evaluation.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::to_writer(BufWriter::new(file), self).map_err(|e| Error::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
