//! Training orchestration: corpus loading, model fitting, evaluation,
//! persistence.

use std::path::PathBuf;

use crate::crf::{Checkpoint, Crf1dTagger, LbfgsOptions, LbfgsTrainer, SequenceTrainer, Tagger};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::quark::Vocabulary;

/// Resolved configuration for one training run.
#[derive(Debug, Clone)]
pub struct Config {
    pub train: PathBuf,
    pub test: PathBuf,
    pub model_name: String,
    pub model_file: PathBuf,
    pub workers: usize,
    pub checkpoint_every: Option<usize>,
}

/// Accuracy summary of a finished run, one entry per corpus.
#[derive(Debug)]
pub struct RunSummary {
    pub train_token_accuracy: f64,
    pub test_token_accuracy: f64,
}

/// Runs the full pipeline with the default L-BFGS trainer.
pub fn run(cfg: &Config) -> Result<RunSummary> {
    let opt = LbfgsOptions {
        workers: cfg.workers,
        checkpoint: cfg.checkpoint_every.map(|every| Checkpoint {
            name: cfg.model_name.clone(),
            every,
        }),
        ..LbfgsOptions::default()
    };
    let mut trainer = LbfgsTrainer::new(opt)?;
    run_with(cfg, &mut trainer)
}

/// Runs the pipeline with a caller-supplied trainer.
///
/// The order is fixed: both corpora are loaded before the model is built,
/// so the vocabulary is final when the topology is sized; the testing
/// corpus is encoded against the frozen vocabulary and never contributes to
/// it; and the model file is written only after training and evaluation
/// succeeded.
pub fn run_with<T: SequenceTrainer>(cfg: &Config, trainer: &mut T) -> Result<RunSummary> {
    let mut vocab = Vocabulary::default();
    let training = Dataset::read_training(&cfg.train, &mut vocab)?;
    let testing = Dataset::read_testing(&cfg.test, &vocab)?;
    log::info!(
        "training: {} instances ({} items), testing: {} instances ({} items), {} labels, {} attributes",
        training.len(),
        training.total_items(),
        testing.len(),
        testing.total_items(),
        vocab.num_labels(),
        vocab.num_attrs()
    );

    let model = trainer.train(&training, &vocab)?;

    let mut accuracies = [0.0; 2];
    for (acc, (name, ds)) in accuracies
        .iter_mut()
        .zip([("Training", &training), ("Testing", &testing)])
    {
        let mut tagger = Crf1dTagger::new(&model);
        let mut eval = Evaluation::new(vocab.num_labels());
        for seq in &ds.seqs {
            let prediction = tagger.tag(seq);
            let reference: Vec<&str> = seq
                .labels
                .iter()
                .map(|&i| vocab.labels.to_str(i).unwrap_or_default())
                .collect();
            let predicted: Vec<&str> = prediction
                .iter()
                .map(|&i| vocab.labels.to_str(i).unwrap_or_default())
                .collect();
            eval.accumulate(&reference, &predicted);
        }
        eval.evaluate();
        println!("{} set:", name);
        print!("{}", eval);
        *acc = eval.token_accuracy();
    }

    model.save(&cfg.model_file)?;
    log::info!("model written to {:?}", cfg.model_file);
    Ok(RunSummary {
        train_token_accuracy: accuracies[0],
        test_token_accuracy: accuracies[1],
    })
}
