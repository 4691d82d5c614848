pub mod context;
pub mod encoder;
pub mod lbfgs;
pub mod model;
pub mod tagger;

pub use self::encoder::{Crf1dEncoder, FeatType};
pub use self::lbfgs::{Checkpoint, LbfgsOptions, LbfgsTrainer};
pub use self::model::{Feature, TrainedModel};
pub use self::tagger::{Crf1dTagger, Tagger};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::quark::Vocabulary;

/// Fits model parameters to a training corpus.
///
/// The orchestrator depends on this seam only, so the pipeline can run
/// against stub trainers in tests.
pub trait SequenceTrainer {
    fn train(&mut self, ds: &Dataset, vocab: &Vocabulary) -> Result<TrainedModel>;
}
