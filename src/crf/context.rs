use bitflags::bitflags;

bitflags! {
    /// Functionality flags: which score tables the context maintains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtxOpt: u8 {
        const VITERBI = 0x01;
        const MARGINALS = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResetOpt: u8 {
        const STATE = 0x01;
        const TRANS = 0x02;
    }
}

/// Lattice work space for one instance of up to `cap_items` items over a
/// fixed label set.
///
/// All matrices are stored row-major: `state` and the forward/backward
/// tables are [T][L], `trans` and its derivatives are [L][L].
#[derive(Debug)]
pub struct Crf1dContext {
    flag: CtxOpt,
    /// The total number of distinct labels (L).
    pub num_labels: usize,
    /// The number of items (T) in the current instance.
    num_items: usize,
    /// High-water mark for the [T]-sized tables.
    cap_items: usize,
    /// Logarithm of the normalization factor for the instance. This is
    /// equivalent to the total score of all paths in the lattice.
    log_norm: f64,
    /// State scores. [t][l] is the total score of state features
    /// associating label #l with item #t.
    pub state: Vec<f64>,
    /// Transition scores. [i][j] is the total score of transition features
    /// associating labels #i and #j.
    pub trans: Vec<f64>,
    /// Scaled alpha matrix: total score of paths from BOS to (t, l).
    alpha_score: Vec<f64>,
    /// Scaled beta matrix: total score of paths from (t, l) to EOS.
    beta_score: Vec<f64>,
    /// Per-item scaling coefficients for the alpha/beta tables.
    scale_factor: Vec<f64>,
    /// [L] work row.
    row: Vec<f64>,
    /// Backward edges for Viterbi: [t][j] holds the label #i maximizing the
    /// score of arriving at (t, j). Only with `CtxOpt::VITERBI`.
    backward_edge: Vec<usize>,
    /// Exponentiated state scores. Only with `CtxOpt::MARGINALS`.
    exp_state: Vec<f64>,
    /// Exponentiated transition scores. Only with `CtxOpt::MARGINALS`.
    exp_trans: Vec<f64>,
    /// Model expectations (marginal probabilities) of states. Only with
    /// `CtxOpt::MARGINALS`.
    pub mexp_state: Vec<f64>,
    /// Model expectations of transitions. Only with `CtxOpt::MARGINALS`.
    pub mexp_trans: Vec<f64>,
}

impl Crf1dContext {
    pub fn new(flag: CtxOpt, num_labels: usize, cap_items: usize) -> Self {
        let ll = num_labels * num_labels;
        let mut this = Self {
            flag,
            num_labels,
            num_items: 0,
            cap_items: 0,
            log_norm: 0.0,
            state: Vec::new(),
            trans: vec![0.0; ll],
            alpha_score: Vec::new(),
            beta_score: Vec::new(),
            scale_factor: Vec::new(),
            row: vec![0.0; num_labels],
            backward_edge: Vec::new(),
            exp_state: Vec::new(),
            exp_trans: Vec::new(),
            mexp_state: Vec::new(),
            mexp_trans: Vec::new(),
        };
        if this.flag.contains(CtxOpt::MARGINALS) {
            this.exp_trans.resize(ll, 0.0);
            this.mexp_trans.resize(ll, 0.0);
        }
        this.resize(cap_items);
        this.num_items = 0;
        this
    }

    /// Sets the instance length, growing the [T]-sized tables when needed.
    pub fn resize(&mut self, num_items: usize) {
        let l = self.num_labels;
        self.num_items = num_items;
        if self.cap_items < num_items {
            let tl = num_items * l;
            self.alpha_score.resize(tl, 0.0);
            self.beta_score.resize(tl, 0.0);
            self.scale_factor.resize(num_items, 0.0);
            self.state.resize(tl, 0.0);
            if self.flag.contains(CtxOpt::VITERBI) {
                self.backward_edge.resize(tl, 0);
            }
            if self.flag.contains(CtxOpt::MARGINALS) {
                self.exp_state.resize(tl, 0.0);
                self.mexp_state.resize(tl, 0.0);
            }
            self.cap_items = num_items;
        }
    }

    pub fn reset(&mut self, opts: ResetOpt) {
        if opts.contains(ResetOpt::STATE) {
            self.state.iter_mut().for_each(|x| *x = 0.0);
        }
        if opts.contains(ResetOpt::TRANS) {
            self.trans.iter_mut().for_each(|x| *x = 0.0);
        }
        if self.flag.contains(CtxOpt::MARGINALS) {
            self.mexp_state.iter_mut().for_each(|x| *x = 0.0);
            self.mexp_trans.iter_mut().for_each(|x| *x = 0.0);
            self.log_norm = 0.0;
        }
    }

    pub fn exp_state(&mut self) {
        for (e, s) in self.exp_state.iter_mut().zip(&self.state) {
            *e = s.exp();
        }
    }

    pub fn exp_transition(&mut self) {
        for (e, s) in self.exp_trans.iter_mut().zip(&self.trans) {
            *e = s.exp();
        }
    }

    pub fn lognorm(&self) -> f64 {
        self.log_norm
    }

    /// Scaled forward recursion:
    ///   alpha[0][j] = state[0][j]
    ///   alpha[t][j] = state[t][j] * sum_i alpha[t-1][i] * trans[i][j]
    /// with every row rescaled to sum 1; the log-normalizer is recovered
    /// from the scale coefficients.
    pub fn alpha_score(&mut self) {
        let l = self.num_labels;
        let t_max = self.num_items;
        if t_max == 0 {
            self.log_norm = 0.0;
            return;
        }

        self.alpha_score[..l].copy_from_slice(&self.exp_state[..l]);
        let sum: f64 = self.alpha_score[..l].iter().sum();
        self.scale_factor[0] = if sum != 0.0 { 1.0 / sum } else { 1.0 };
        for v in &mut self.alpha_score[..l] {
            *v *= self.scale_factor[0];
        }

        for t in 1..t_max {
            for j in 0..l {
                self.alpha_score[l * t + j] = 0.0;
            }
            for i in 0..l {
                let prev = self.alpha_score[l * (t - 1) + i];
                for j in 0..l {
                    self.alpha_score[l * t + j] += prev * self.exp_trans[l * i + j];
                }
            }
            let mut sum = 0.0;
            for j in 0..l {
                self.alpha_score[l * t + j] *= self.exp_state[l * t + j];
                sum += self.alpha_score[l * t + j];
            }
            self.scale_factor[t] = if sum != 0.0 { 1.0 / sum } else { 1.0 };
            for j in 0..l {
                self.alpha_score[l * t + j] *= self.scale_factor[t];
            }
        }

        /*
        norm = 1. / (C[0] * C[1] ... * C[T-1])
        log(norm) = - sum_{t} log(C[t])
        */
        self.log_norm = -self.scale_factor[..t_max]
            .iter()
            .map(|c| c.ln())
            .sum::<f64>();
    }

    /// Scaled backward recursion, sharing the scale coefficients computed by
    /// [`Self::alpha_score`].
    pub fn beta_score(&mut self) {
        let l = self.num_labels;
        let t_max = self.num_items;
        if t_max == 0 {
            return;
        }

        for i in 0..l {
            self.beta_score[l * (t_max - 1) + i] = self.scale_factor[t_max - 1];
        }

        for t in (0..t_max - 1).rev() {
            /* row[j] = state[t+1][j] * beta[t+1][j] */
            for j in 0..l {
                self.row[j] =
                    self.beta_score[l * (t + 1) + j] * self.exp_state[l * (t + 1) + j];
            }
            for i in 0..l {
                let mut s = 0.0;
                for j in 0..l {
                    s += self.exp_trans[l * i + j] * self.row[j];
                }
                self.beta_score[l * t + i] = s * self.scale_factor[t];
            }
        }
    }

    /// Fills `mexp_state` and `mexp_trans` with marginal probabilities:
    ///   p(t,i)       = alpha[t][i] * beta[t][i] / C[t]
    ///   p(t,i,t+1,j) = alpha[t][i] * trans[i][j] * state[t+1][j] * beta[t+1][j]
    /// where the transition expectation is summed over t.
    pub fn marginals(&mut self) {
        let l = self.num_labels;
        let t_max = self.num_items;

        for t in 0..t_max {
            for i in 0..l {
                self.mexp_state[l * t + i] = self.alpha_score[l * t + i]
                    * self.beta_score[l * t + i]
                    / self.scale_factor[t];
            }
        }

        for t in 0..t_max.saturating_sub(1) {
            for j in 0..l {
                self.row[j] =
                    self.beta_score[l * (t + 1) + j] * self.exp_state[l * (t + 1) + j];
            }
            for i in 0..l {
                for j in 0..l {
                    self.mexp_trans[l * i + j] +=
                        self.alpha_score[l * t + i] * self.exp_trans[l * i + j] * self.row[j];
                }
            }
        }
    }

    /// Unnormalized log-score of a label path.
    pub fn score(&self, labels: &[usize]) -> f64 {
        let l = self.num_labels;
        let mut iter = labels.iter();
        let mut prev = match iter.next() {
            Some(&i) => i,
            None => return 0.0,
        };
        let mut r = self.state[prev];
        for (t, &cur) in iter.enumerate() {
            r += self.trans[l * prev + cur] + self.state[l * (t + 1) + cur];
            prev = cur;
        }
        r
    }

    /// Decodes the best path into `labels`, returning its unnormalized
    /// log-score. State and transition scores are read in the log domain.
    pub fn viterbi(&mut self, labels: &mut Vec<usize>) -> f64 {
        let l = self.num_labels;
        let t_max = self.num_items;
        labels.clear();
        if t_max == 0 || l == 0 {
            return 0.0;
        }
        labels.resize(t_max, 0);

        for j in 0..l {
            self.alpha_score[j] = self.state[j];
        }
        for t in 1..t_max {
            for j in 0..l {
                let mut max_score = f64::NEG_INFINITY;
                let mut argmax = 0;
                for i in 0..l {
                    /* Transit from (t-1, i) to (t, j). */
                    let score = self.alpha_score[l * (t - 1) + i] + self.trans[l * i + j];
                    if max_score < score {
                        max_score = score;
                        argmax = i;
                    }
                }
                self.backward_edge[l * t + j] = argmax;
                self.alpha_score[l * t + j] = max_score + self.state[l * t + j];
            }
        }

        /* Find the node (T-1, i) that reaches EOS with the maximum score. */
        let mut max_score = f64::NEG_INFINITY;
        for i in 0..l {
            let score = self.alpha_score[l * (t_max - 1) + i];
            if max_score < score {
                max_score = score;
                labels[t_max - 1] = i;
            }
        }
        /* Tag labels by tracing the backward links. */
        for t in (0..t_max - 1).rev() {
            labels[t] = self.backward_edge[l * (t + 1) + labels[t + 1]];
        }
        max_score
    }
}
