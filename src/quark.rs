use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Interned string table assigning dense ids in insertion order.
///
/// Serializes as a plain string array; the reverse map is rebuilt on load.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Quark {
    v: Vec<String>,
    m: HashMap<String, usize>,
}

impl From<Vec<String>> for Quark {
    fn from(v: Vec<String>) -> Self {
        let m = v
            .iter()
            .enumerate()
            .map(|(i, s)| (s.to_string(), i))
            .collect();
        Self { v, m }
    }
}

impl From<Quark> for Vec<String> {
    fn from(q: Quark) -> Self {
        q.v
    }
}

impl Quark {
    /// Returns the id of `key`, interning it if unseen.
    pub fn find_or_insert(&mut self, key: &str) -> usize {
        if let Some(&id) = self.m.get(key) {
            return id;
        }
        let id = self.v.len();
        self.m.insert(key.to_string(), id);
        self.v.push(key.to_string());
        id
    }

    pub fn to_id(&self, s: &str) -> Option<usize> {
        self.m.get(s).copied()
    }

    pub fn to_str(&self, id: usize) -> Option<&str> {
        self.v.get(id).map(|x| x.as_str())
    }

    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }
}

/// Shared label/attribute vocabulary.
///
/// Built while reading the training corpus and frozen afterwards: the
/// testing corpus is encoded against it read-only.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub labels: Quark,
    pub attrs: Quark,
}

impl Vocabulary {
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn num_attrs(&self) -> usize {
        self.attrs.len()
    }
}
