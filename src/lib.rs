//! Linear-chain CRF sequence-tagger training.
//!
//! Reads a labeled training corpus and a held-out testing corpus, fits a
//! fully-connected linear-chain CRF by L-BFGS label-likelihood estimation,
//! reports token and per-label accuracy for both corpora, and serializes
//! the trained model for later tagging.

pub mod crf;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod quark;
pub mod run;

pub use crate::crf::{
    Checkpoint, Crf1dTagger, LbfgsOptions, LbfgsTrainer, SequenceTrainer, Tagger, TrainedModel,
};
pub use crate::dataset::{Attr, Dataset, Item, Sequence};
pub use crate::error::{Error, Result};
pub use crate::evaluation::Evaluation;
pub use crate::quark::{Quark, Vocabulary};
pub use crate::run::{run, run_with, Config, RunSummary};
