use std::fs;
use std::path::{Path, PathBuf};

use crftrain::{run, Config, Crf1dTagger, Dataset, Error, Tagger, TrainedModel, Vocabulary};

/// Ten two-label instances; the `w-sun`/`w-rain` attributes identify the
/// label, `tok` fires everywhere.
fn training_text() -> String {
    let mut s = String::new();
    for i in 0..10 {
        for t in 0..4 {
            if (i + t) % 2 == 0 {
                s.push_str("sunny\tw-sun\ttok\n");
            } else {
                s.push_str("rainy\tw-rain\ttok\n");
            }
        }
        s.push('\n');
    }
    s
}

/// Three instances disjoint from the training ones, lengths 2, 3 and 5.
fn testing_text() -> String {
    "sunny\tw-sun\ttok\nsunny\tw-sun\ttok\n\n\
     rainy\tw-rain\ttok\nsunny\tw-sun\ttok\nrainy\tw-rain\ttok\n\n\
     rainy\tw-rain\ttok\nrainy\tw-rain\ttok\nsunny\tw-sun\ttok\nrainy\tw-rain\ttok\nsunny\tw-sun\ttok\n\n"
        .to_string()
}

fn write_corpora(dir: &Path) -> (PathBuf, PathBuf) {
    let train = dir.join("train.data");
    let test = dir.join("test.data");
    fs::write(&train, training_text()).expect("write training corpus");
    fs::write(&test, testing_text()).expect("write testing corpus");
    (train, test)
}

fn config(dir: &Path, workers: usize) -> Config {
    let (train, test) = write_corpora(dir);
    Config {
        train,
        test,
        model_name: dir.join("ner").display().to_string(),
        model_file: dir.join("ner.model"),
        workers,
        checkpoint_every: None,
    }
}

#[test]
fn train_evaluate_persist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = config(dir.path(), 4);
    let summary = run(&cfg).expect("run");

    // the corpus is separable, so training accuracy should be essentially
    // perfect once the optimizer converged
    assert!(
        summary.train_token_accuracy > 0.9,
        "training accuracy {}",
        summary.train_token_accuracy
    );
    assert!(
        summary.test_token_accuracy > 0.9,
        "testing accuracy {}",
        summary.test_token_accuracy
    );

    let meta = fs::metadata(&cfg.model_file).expect("model file exists");
    assert!(meta.len() > 0, "model file is empty");

    // reload the model and tag the testing instances against its own
    // vocabulary; every decoded path must match the instance length
    let model = TrainedModel::load(&cfg.model_file).expect("load model");
    let vocab = Vocabulary {
        labels: model.labels().clone(),
        attrs: model.attrs().clone(),
    };
    let testing = Dataset::read_testing(&cfg.test, &vocab).expect("read testing corpus");
    assert_eq!(testing.len(), 3);
    let mut tagger = Crf1dTagger::new(&model);
    let mut correct = 0;
    let mut total = 0;
    for seq in &testing.seqs {
        let path = tagger.tag(seq);
        assert_eq!(path.len(), seq.len());
        correct += path
            .iter()
            .zip(&seq.labels)
            .filter(|(p, r)| p == r)
            .count();
        total += seq.len();
    }
    assert!(correct as f64 / total as f64 > 0.9);
}

#[test]
fn malformed_corpus_produces_no_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = config(dir.path(), 2);
    fs::write(&cfg.train, "sunny\tw-sun\nthis line has no tab\n").expect("write corpus");
    cfg.model_file = dir.path().join("never-written.model");
    let err = run(&cfg).unwrap_err();
    assert!(matches!(err, Error::CorpusFormat { .. }), "{:?}", err);
    assert_eq!(err.exit_code(), 3);
    assert!(!cfg.model_file.exists());
}

#[test]
fn testing_corpus_does_not_influence_weights() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg_a = config(dir.path(), 2);

    let dir_b = tempfile::tempdir().expect("tempdir");
    let mut cfg_b = config(dir_b.path(), 2);
    // same training corpus, entirely different held-out data
    fs::write(
        &cfg_b.test,
        "rainy\tw-rain\ttok\n\nsunny\ttok\tw-unseen\n\n",
    )
    .expect("write testing corpus");

    run(&cfg_a).expect("run a");
    run(&cfg_b).expect("run b");

    let model_a = TrainedModel::load(&cfg_a.model_file).expect("load a");
    let model_b = TrainedModel::load(&cfg_b.model_file).expect("load b");
    assert_eq!(model_a.features().len(), model_b.features().len());
    for (fa, fb) in model_a.features().iter().zip(model_b.features()) {
        assert_eq!((fa.src, fa.dst), (fb.src, fb.dst));
        assert!(
            (fa.weight - fb.weight).abs() < 1e-12,
            "weights diverged: {} vs {}",
            fa.weight,
            fb.weight
        );
    }
}

#[test]
fn accuracy_is_stable_across_pool_sizes() {
    let dir1 = tempfile::tempdir().expect("tempdir");
    let summary1 = run(&config(dir1.path(), 1)).expect("run single-worker");
    let dir4 = tempfile::tempdir().expect("tempdir");
    let summary4 = run(&config(dir4.path(), 4)).expect("run pooled");
    assert!(
        (summary1.train_token_accuracy - summary4.train_token_accuracy).abs() < 1e-6,
        "{} vs {}",
        summary1.train_token_accuracy,
        summary4.train_token_accuracy
    );
    assert!(
        (summary1.test_token_accuracy - summary4.test_token_accuracy).abs() < 1e-6,
        "{} vs {}",
        summary1.test_token_accuracy,
        summary4.test_token_accuracy
    );
}

#[test]
fn checkpoints_are_written_when_enabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = config(dir.path(), 2);
    cfg.checkpoint_every = Some(1);
    run(&cfg).expect("run");
    let snapshots = fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("ner.iter")
        })
        .count();
    assert!(snapshots > 0, "no checkpoint snapshots written");
    // snapshots are tagging-capable models in their own right
    let first = dir.path().join("ner.iter1");
    if first.exists() {
        TrainedModel::load(&first).expect("load checkpoint");
    }
}
