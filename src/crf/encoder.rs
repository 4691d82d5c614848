use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::context::{Crf1dContext, CtxOpt, ResetOpt};
use super::model::{Feature, TrainedModel};
use crate::dataset::{Dataset, Sequence};
use crate::quark::Vocabulary;

/// Feature kinds: state features pair an attribute with a label, transition
/// features pair a source label with a destination label.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Clone, Copy)]
pub enum FeatType {
    State,
    Trans,
}

/// A generated feature with its empirical frequency in the training corpus.
#[derive(Debug, Clone)]
pub(crate) struct Feat {
    pub ftype: FeatType,
    pub src: usize,
    pub dst: usize,
    pub freq: f64,
}

/// Indices of the features fired by one attribute (state features) or
/// leaving one label (transition features).
pub(crate) type FeatRefs = Vec<usize>;

#[derive(Debug, Default)]
struct FeatSet {
    m: HashMap<(FeatType, usize, usize), f64>,
}

impl FeatSet {
    fn add(&mut self, ftype: FeatType, src: usize, dst: usize, freq: f64) {
        *self.m.entry((ftype, src, dst)).or_insert(0.0) += freq;
    }

    /// Drains the set into a deterministically ordered feature table.
    /// Sorting fixes the feature ids, so repeated runs over the same corpus
    /// produce identical weight vectors.
    fn into_vec(self, min_freq: f64) -> Vec<Feat> {
        let mut v: Vec<Feat> = self
            .m
            .into_iter()
            .filter(|(_, freq)| *freq >= min_freq)
            .map(|((ftype, src, dst), freq)| Feat {
                ftype,
                src,
                dst,
                freq,
            })
            .collect();
        v.sort_by_key(|f| (f.ftype, f.src, f.dst));
        v
    }
}

/// Feature generation over a training corpus.
///
/// `connect_all_edges` emits a transition feature for every ordered label
/// pair, observed or not: the fully-connected state topology.
/// `connect_all_attrs` would do the same for (attribute, label) pairs and is
/// kept off, so the weight space stays dimensioned by the observed corpus.
fn generate_features(
    ds: &Dataset,
    num_labels: usize,
    connect_all_attrs: bool,
    connect_all_edges: bool,
    min_freq: f64,
) -> Vec<Feat> {
    let l = num_labels;
    let mut set = FeatSet::default();
    for seq in &ds.seqs {
        /* Transitions with previous label #L are BOS and generate nothing. */
        let mut prev = l;
        for (item, &cur) in seq.items.iter().zip(&seq.labels) {
            if prev != l {
                set.add(FeatType::Trans, prev, cur, seq.weight);
            }
            for attr in item {
                set.add(FeatType::State, attr.id, cur, seq.weight * attr.value);
                if connect_all_attrs {
                    for i in 0..l {
                        set.add(FeatType::State, attr.id, i, 0.0);
                    }
                }
            }
            prev = cur;
        }
    }
    if connect_all_edges {
        for i in 0..l {
            for j in 0..l {
                set.add(FeatType::Trans, i, j, 0.0);
            }
        }
    }
    set.into_vec(min_freq)
}

fn init_references(features: &[Feat], num_attrs: usize, num_labels: usize) -> (Vec<FeatRefs>, Vec<FeatRefs>) {
    /*
        Collect references (indices) of:
        - state features fired by each attribute (attrs)
        - transition features pointing from each label (forward_trans)
    */
    let mut attrs = vec![FeatRefs::default(); num_attrs];
    let mut forward_trans = vec![FeatRefs::default(); num_labels];
    for (k, f) in features.iter().enumerate() {
        match f.ftype {
            FeatType::State => attrs[f.src].push(k),
            FeatType::Trans => forward_trans[f.src].push(k),
        }
    }
    (attrs, forward_trans)
}

#[derive(Debug)]
struct EncoderOpt {
    feature_possible_states: bool,
    feature_possible_transitions: bool,
    feature_min_freq: f64,
}

impl Default for EncoderOpt {
    fn default() -> Self {
        Self {
            feature_possible_states: false,
            feature_possible_transitions: true,
            feature_min_freq: 0.0,
        }
    }
}

/// The training-side view of the graphical model: the feature table, the
/// reference lists the scoring loops walk, and the batch objective.
///
/// Immutable during optimization; every worker owns a private
/// [`Crf1dContext`] and gradient buffer.
#[derive(Debug, Default)]
pub struct Crf1dEncoder {
    opt: EncoderOpt,
    features: Vec<Feat>,
    attrs: Vec<FeatRefs>,
    forward_trans: Vec<FeatRefs>,
    max_items: usize,
}

impl Crf1dEncoder {
    pub fn num_labels(&self) -> usize {
        self.forward_trans.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Initializes the encoder with a training data set.
    pub fn set_data(&mut self, ds: &Dataset, vocab: &Vocabulary) {
        let l = vocab.num_labels();
        let a = vocab.num_attrs();
        log::info!(
            "set data (L: {}, A: {}, N: {}, T: {})",
            l,
            a,
            ds.len(),
            ds.max_seq_length()
        );
        log::info!(
            "feature generation (min_freq: {}, possible_states: {}, possible_transitions: {})",
            self.opt.feature_min_freq,
            self.opt.feature_possible_states,
            self.opt.feature_possible_transitions
        );
        let begin = Instant::now();
        self.features = generate_features(
            ds,
            l,
            self.opt.feature_possible_states,
            self.opt.feature_possible_transitions,
            self.opt.feature_min_freq,
        );
        log::info!(
            "number of features: {}, time cost: {:?}",
            self.features.len(),
            begin.elapsed()
        );
        let (attrs, forward_trans) = init_references(&self.features, a, l);
        self.attrs = attrs;
        self.forward_trans = forward_trans;
        self.max_items = ds.max_seq_length();
    }

    fn state_score(&self, ctx: &mut Crf1dContext, seq: &Sequence, w: &[f64]) {
        let l = self.num_labels();
        for (t, item) in seq.items.iter().enumerate() {
            for attr in item {
                /* State feature associates attribute #a with label #(f.dst). */
                for &fid in &self.attrs[attr.id] {
                    let f = &self.features[fid];
                    ctx.state[l * t + f.dst] += w[fid] * attr.value;
                }
            }
        }
    }

    fn transition_score(&self, ctx: &mut Crf1dContext, w: &[f64]) {
        let l = self.num_labels();
        for (i, edge) in self.forward_trans.iter().enumerate() {
            for &fid in edge {
                ctx.trans[l * i + self.features[fid].dst] = w[fid];
            }
        }
    }

    /// Adds the model expectations of the current instance to `g`.
    fn model_expectation(&self, ctx: &Crf1dContext, seq: &Sequence, g: &mut [f64], weight: f64) {
        let l = self.num_labels();
        for (t, item) in seq.items.iter().enumerate() {
            for attr in item {
                for &fid in &self.attrs[attr.id] {
                    let f = &self.features[fid];
                    g[fid] += ctx.mexp_state[l * t + f.dst] * attr.value * weight;
                }
            }
        }
        for (i, edge) in self.forward_trans.iter().enumerate() {
            for &fid in edge {
                let f = &self.features[fid];
                g[fid] += ctx.mexp_trans[l * i + f.dst] * weight;
            }
        }
    }

    /// Computes the negative log-likelihood of the data set and writes its
    /// gradient into `g`, fanning the per-instance forward-backward passes
    /// out over `pool`.
    ///
    /// Instances are split into one contiguous chunk per worker; partial
    /// gradients are folded back in chunk order, so the result does not
    /// depend on thread scheduling.
    pub fn objective_and_gradients_batch(
        &self,
        ds: &Dataset,
        w: &[f64],
        g: &mut [f64],
        pool: &rayon::ThreadPool,
    ) -> f64 {
        /* Initialize the gradients with the negated observation expectations. */
        for (gi, f) in g.iter_mut().zip(&self.features) {
            *gi = -f.freq;
        }
        if ds.is_empty() {
            return 0.0;
        }

        let workers = pool.current_num_threads().max(1);
        let chunk = ds.len().div_ceil(workers);
        let num_features = self.num_features();
        let partials: Vec<(f64, Vec<f64>)> = pool.install(|| {
            ds.seqs
                .par_chunks(chunk)
                .map(|seqs| {
                    let mut ctx =
                        Crf1dContext::new(CtxOpt::MARGINALS, self.num_labels(), self.max_items);
                    ctx.reset(ResetOpt::TRANS);
                    self.transition_score(&mut ctx, w);
                    ctx.exp_transition();
                    let mut part = vec![0.0; num_features];
                    let mut logl = 0.0;
                    for seq in seqs {
                        ctx.resize(seq.len());
                        ctx.reset(ResetOpt::STATE);
                        self.state_score(&mut ctx, seq, w);
                        ctx.exp_state();
                        ctx.alpha_score();
                        ctx.beta_score();
                        ctx.marginals();
                        logl += (ctx.score(&seq.labels) - ctx.lognorm()) * seq.weight;
                        self.model_expectation(&ctx, seq, &mut part, seq.weight);
                    }
                    (logl, part)
                })
                .collect()
        });

        let mut logl = 0.0;
        for (part_logl, part_g) in partials {
            logl += part_logl;
            for (gi, p) in g.iter_mut().zip(part_g) {
                *gi += p;
            }
        }
        -logl
    }

    /// Materializes a trained model from a weight vector.
    pub fn snapshot(&self, w: &[f64], vocab: &Vocabulary) -> TrainedModel {
        let features = self
            .features
            .iter()
            .zip(w)
            .map(|(f, &weight)| Feature {
                cat: f.ftype,
                src: f.src,
                dst: f.dst,
                weight,
            })
            .collect();
        TrainedModel::from_parts(vocab.labels.clone(), vocab.attrs.clone(), features)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;

    use super::*;

    fn dataset(text: &str) -> (Dataset, Vocabulary) {
        let mut vocab = Vocabulary::default();
        let ds = crate::dataset::test_support::parse_str(Cursor::new(text), Path::new("test.data"), &mut vocab)
            .expect("parse");
        (ds, vocab)
    }

    fn pool(threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("pool")
    }

    #[test]
    fn set_data() {
        let mut o = Crf1dEncoder::default();
        assert_eq!(o.num_features(), 0);
        assert_eq!(o.num_labels(), 0);
        let (ds, vocab) = dataset("P\thello\tworld\nQ\thi\tthere\n\n");
        o.set_data(&ds, &vocab);
        assert_eq!(o.num_labels(), 2);
        // 4 observed state features + 4 fully-connected transitions
        assert_eq!(o.num_features(), 8);
        assert_eq!(o.attrs.len(), 4);
        assert_eq!(o.forward_trans.len(), 2);
    }

    #[test]
    fn feature_ids_are_deterministic() {
        let text = "P\thello\tworld\nQ\thi\tthere\n\nQ\tworld\n\n";
        let (ds, vocab) = dataset(text);
        let mut a = Crf1dEncoder::default();
        a.set_data(&ds, &vocab);
        let (ds2, vocab2) = dataset(text);
        let mut b = Crf1dEncoder::default();
        b.set_data(&ds2, &vocab2);
        for (x, y) in a.features.iter().zip(&b.features) {
            assert_eq!((x.ftype, x.src, x.dst), (y.ftype, y.src, y.dst));
            assert_eq!(x.freq, y.freq);
        }
    }

    #[test]
    fn transition_features_are_fully_connected() {
        let (ds, vocab) = dataset("P\ta\nQ\tb\nR\tc\n\n");
        let mut o = Crf1dEncoder::default();
        o.set_data(&ds, &vocab);
        let trans = o
            .features
            .iter()
            .filter(|f| f.ftype == FeatType::Trans)
            .count();
        assert_eq!(trans, 9);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (ds, vocab) = dataset("P\ta\tc\nQ\tb\nP\ta\n\nQ\tb\tc\nQ\tb\n\n");
        let mut o = Crf1dEncoder::default();
        o.set_data(&ds, &vocab);
        let k = o.num_features();
        let pool = pool(1);
        // arbitrary fixed point, away from the all-zeros saddle
        let w: Vec<f64> = (0..k).map(|i| 0.05 * (i as f64) - 0.1).collect();
        let mut g = vec![0.0; k];
        o.objective_and_gradients_batch(&ds, &w, &mut g, &pool);
        let eps = 1e-6;
        for i in 0..k {
            let mut wp = w.clone();
            wp[i] += eps;
            let mut wm = w.clone();
            wm[i] -= eps;
            let mut scratch = vec![0.0; k];
            let fp = o.objective_and_gradients_batch(&ds, &wp, &mut scratch, &pool);
            let fm = o.objective_and_gradients_batch(&ds, &wm, &mut scratch, &pool);
            let numeric = (fp - fm) / (2.0 * eps);
            assert!(
                (g[i] - numeric).abs() < 1e-5,
                "feature {i}: analytic {} != numeric {}",
                g[i],
                numeric
            );
        }
    }

    #[test]
    fn objective_is_independent_of_pool_size() {
        let (ds, vocab) = dataset("P\ta\nQ\tb\n\nP\ta\tc\n\nQ\tb\nQ\tc\n\nP\tc\n\n");
        let mut o = Crf1dEncoder::default();
        o.set_data(&ds, &vocab);
        let k = o.num_features();
        let w: Vec<f64> = (0..k).map(|i| 0.01 * (i as f64)).collect();
        let mut g1 = vec![0.0; k];
        let mut g4 = vec![0.0; k];
        let f1 = o.objective_and_gradients_batch(&ds, &w, &mut g1, &pool(1));
        let f4 = o.objective_and_gradients_batch(&ds, &w, &mut g4, &pool(4));
        assert!((f1 - f4).abs() < 1e-9, "{f1} != {f4}");
        for (a, b) in g1.iter().zip(&g4) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
