use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::quark::Vocabulary;

/// A single attribute observation: interned attribute id and its value.
#[derive(Debug, Clone)]
pub struct Attr {
    pub id: usize,
    pub value: f64,
}

impl Attr {
    pub fn new(id: usize, value: f64) -> Self {
        Self { id, value }
    }
}

pub type Item = Vec<Attr>;

/// One labeled instance: items aligned with gold label ids.
#[derive(Debug)]
pub struct Sequence {
    pub items: Vec<Item>,
    pub labels: Vec<usize>,
    pub weight: f64,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            labels: Vec::new(),
            weight: 1.0,
        }
    }
}

impl Sequence {
    pub fn push(&mut self, item: Item, label: usize) {
        self.items.push(item);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A labeled corpus: ordered instances encoded against a shared vocabulary.
#[derive(Debug, Default)]
pub struct Dataset {
    pub seqs: Vec<Sequence>,
}

impl Dataset {
    /// Reads a corpus, interning unseen labels and attributes into `vocab`.
    /// An empty corpus is rejected: no labels means no states to train.
    pub fn read_training(path: &Path, vocab: &mut Vocabulary) -> Result<Self> {
        let file = open(path)?;
        let Vocabulary { labels, attrs } = vocab;
        let ds = parse_lines(
            BufReader::new(file),
            path,
            &mut |s| Some(labels.find_or_insert(s)),
            &mut |s| Some(attrs.find_or_insert(s)),
        )?;
        if ds.is_empty() {
            return Err(Error::EmptyCorpus {
                path: path.to_path_buf(),
            });
        }
        Ok(ds)
    }

    /// Reads a corpus against a frozen vocabulary: attributes unseen in
    /// training carry no weight and are dropped; a gold label unseen in
    /// training cannot be scored and is a corpus error.
    pub fn read_testing(path: &Path, vocab: &Vocabulary) -> Result<Self> {
        let file = open(path)?;
        parse_lines(
            BufReader::new(file),
            path,
            &mut |s| vocab.labels.to_id(s),
            &mut |s| vocab.attrs.to_id(s),
        )
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn max_seq_length(&self) -> usize {
        self.seqs.iter().map(|x| x.len()).max().unwrap_or_default()
    }

    pub fn total_items(&self) -> usize {
        self.seqs.iter().map(|x| x.len()).sum()
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::CorpusIo {
        path: path.to_path_buf(),
        source: e,
    })
}

fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> Error {
    Error::CorpusFormat {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Record grammar: `label TAB attr (TAB attr)*`, instances separated by
/// blank or whitespace-only lines. `label_to_id` returning None rejects the
/// record; `attr_to_id` returning None drops the attribute.
fn parse_lines<R: BufRead>(
    reader: R,
    path: &Path,
    label_to_id: &mut dyn FnMut(&str) -> Option<usize>,
    attr_to_id: &mut dyn FnMut(&str) -> Option<usize>,
) -> Result<Dataset> {
    let mut ds = Dataset::default();
    let mut seq = Sequence::default();
    for (n, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::CorpusIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        let n = n + 1;
        if line.trim().is_empty() {
            if !seq.is_empty() {
                ds.seqs.push(std::mem::take(&mut seq));
            }
            continue;
        }
        let (label, attrs) = line
            .split_once('\t')
            .ok_or_else(|| malformed(path, n, "expected `label<TAB>attr...`"))?;
        if label.is_empty() {
            return Err(malformed(path, n, "empty label field"));
        }
        let lid = label_to_id(label).ok_or_else(|| {
            malformed(
                path,
                n,
                format!("label {:?} does not occur in the training corpus", label),
            )
        })?;
        let mut item = Item::new();
        for attr in attrs.split('\t') {
            if attr.is_empty() {
                return Err(malformed(path, n, "empty attribute field"));
            }
            if let Some(aid) = attr_to_id(attr) {
                item.push(Attr::new(aid, 1.0));
            }
        }
        seq.push(item, lid);
    }
    if !seq.is_empty() {
        ds.seqs.push(seq);
    }
    Ok(ds)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Parses a corpus from any reader in training mode, for in-crate tests.
    pub(crate) fn parse_str<R: BufRead>(
        reader: R,
        path: &Path,
        vocab: &mut Vocabulary,
    ) -> Result<Dataset> {
        let Vocabulary { labels, attrs } = vocab;
        parse_lines(
            reader,
            path,
            &mut |x| Some(labels.find_or_insert(x)),
            &mut |x| Some(attrs.find_or_insert(x)),
        )
    }
}
