use super::context::{Crf1dContext, CtxOpt, ResetOpt};
use super::model::TrainedModel;
use crate::dataset::Sequence;

/// Decodes label sequences for instances.
pub trait Tagger {
    fn set_seq(&mut self, seq: &Sequence);
    fn viterbi(&mut self, labels: &mut Vec<usize>) -> f64;

    /// Decodes `seq` in one shot; the returned path has one label id per
    /// item.
    fn tag(&mut self, seq: &Sequence) -> Vec<usize> {
        self.set_seq(seq);
        let mut labels = Vec::new();
        self.viterbi(&mut labels);
        labels
    }
}

/// Viterbi decoder bound to a trained model snapshot.
pub struct Crf1dTagger<'a> {
    model: &'a TrainedModel,
    ctx: Crf1dContext,
}

impl<'a> Crf1dTagger<'a> {
    pub fn new(model: &'a TrainedModel) -> Self {
        let l = model.num_labels();
        let mut ctx = Crf1dContext::new(CtxOpt::VITERBI, l, 0);
        /* Transition scores are fixed by the model; set them once. */
        for i in 0..l {
            for &fid in model.label_ref(i) {
                let f = model.feature(fid);
                ctx.trans[l * i + f.dst] = f.weight;
            }
        }
        Self { model, ctx }
    }
}

impl<'a> Tagger for Crf1dTagger<'a> {
    fn set_seq(&mut self, seq: &Sequence) {
        let l = self.ctx.num_labels;
        self.ctx.resize(seq.len());
        self.ctx.reset(ResetOpt::STATE);
        for (t, item) in seq.items.iter().enumerate() {
            for attr in item {
                /* The value usually carries the attribute frequency in the item. */
                for &fid in self.model.attr_ref(attr.id) {
                    let f = self.model.feature(fid);
                    self.ctx.state[l * t + f.dst] += f.weight * attr.value;
                }
            }
        }
    }

    fn viterbi(&mut self, labels: &mut Vec<usize>) -> f64 {
        self.ctx.viterbi(labels)
    }
}
