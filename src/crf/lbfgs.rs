use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::path::PathBuf;

use libc::c_void;
use liblbfgs_sys::{
    lbfgs, lbfgs_free, lbfgs_malloc, lbfgs_parameter_init, lbfgs_parameter_t, lbfgs_strerror,
};

use super::encoder::Crf1dEncoder;
use super::model::TrainedModel;
use super::SequenceTrainer;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::quark::Vocabulary;

/// Checkpoint policy: write a model snapshot every `every` optimizer
/// iterations under `<name>.iter<k>`.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub name: String,
    pub every: usize,
}

impl Checkpoint {
    fn path_for(&self, iteration: usize) -> PathBuf {
        PathBuf::from(format!("{}.iter{}", self.name, iteration))
    }
}

/// liblbfgs settings for label-likelihood estimation.
///
/// `max_iterations = 0` lets the optimizer run to its own convergence
/// criterion (epsilon/delta over a `past`-iteration window).
#[derive(Debug, Clone)]
pub struct LbfgsOptions {
    /// L2 regularization coefficient.
    pub c2: f64,
    /// Number of correction pairs kept by the optimizer.
    pub memory: i32,
    pub epsilon: f64,
    pub past: i32,
    pub delta: f64,
    pub max_iterations: i32,
    /// Worker-pool size for gradient computation. A concurrency hint: the
    /// converged result is the same up to floating-point associativity.
    pub workers: usize,
    pub checkpoint: Option<Checkpoint>,
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        Self {
            c2: 0.1,
            memory: 6,
            epsilon: 1e-5,
            past: 10,
            delta: 1e-5,
            max_iterations: 0,
            workers: 4,
            checkpoint: None,
        }
    }
}

/// Trains a fully-connected linear-chain CRF by L-BFGS over the batch
/// label-likelihood objective.
///
/// Owns the worker pool; dropping the trainer joins the workers, on every
/// exit path.
pub struct LbfgsTrainer {
    opt: LbfgsOptions,
    pool: rayon::ThreadPool,
    encoder: Crf1dEncoder,
}

impl LbfgsTrainer {
    pub fn new(opt: LbfgsOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opt.workers)
            .build()
            .map_err(|e| Error::Training(format!("failed to build worker pool: {}", e)))?;
        Ok(Self {
            opt,
            pool,
            encoder: Crf1dEncoder::default(),
        })
    }
}

/// Everything the optimizer callbacks need, reached through the opaque
/// instance pointer.
struct FitState<'a> {
    encoder: &'a Crf1dEncoder,
    ds: &'a Dataset,
    vocab: &'a Vocabulary,
    pool: &'a rayon::ThreadPool,
    c2: f64,
    checkpoint: Option<&'a Checkpoint>,
}

unsafe extern "C" fn proc_evaluate(
    instance: *mut c_void,
    x: *const f64,
    g: *mut f64,
    n: i32,
    _step: f64,
) -> f64 {
    let state = &mut *(instance as *mut FitState);
    let w = std::slice::from_raw_parts(x, n as usize);
    let grad = std::slice::from_raw_parts_mut(g, n as usize);

    let mut fx = state
        .encoder
        .objective_and_gradients_batch(state.ds, w, grad, state.pool);

    /* L2 regularization. */
    if state.c2 > 0.0 {
        let c22 = state.c2 * 2.0;
        let mut norm = 0.0;
        for (gi, wi) in grad.iter_mut().zip(w) {
            *gi += c22 * wi;
            norm += wi * wi;
        }
        fx += state.c2 * norm;
    }
    fx
}

unsafe extern "C" fn proc_progress(
    instance: *mut c_void,
    x: *const f64,
    _g: *const f64,
    fx: f64,
    xnorm: f64,
    gnorm: f64,
    step: f64,
    n: i32,
    k: i32,
    _ls: i32,
) -> i32 {
    let state = &mut *(instance as *mut FitState);
    log::info!(
        "iteration {}: loss: {:.6}, |w|: {:.4}, |g|: {:.4}, step: {:.6}",
        k,
        fx,
        xnorm,
        gnorm,
        step
    );
    if let Some(cp) = state.checkpoint {
        if cp.every > 0 && (k as usize) % cp.every == 0 {
            let w = std::slice::from_raw_parts(x, n as usize);
            let path = cp.path_for(k as usize);
            match state.encoder.snapshot(w, state.vocab).save(&path) {
                Ok(()) => log::info!("checkpoint written to {:?}", path),
                // a failed snapshot never aborts the run; the final persist
                // step still decides success
                Err(e) => log::error!("checkpoint failed: {}", e),
            }
        }
    }
    0
}

impl SequenceTrainer for LbfgsTrainer {
    fn train(&mut self, ds: &Dataset, vocab: &Vocabulary) -> Result<TrainedModel> {
        self.encoder.set_data(ds, vocab);
        let k = self.encoder.num_features();
        if k == 0 {
            return Err(Error::Training(
                "no features generated from the training corpus".to_string(),
            ));
        }

        let mut params = MaybeUninit::<lbfgs_parameter_t>::uninit();
        let mut params = unsafe {
            lbfgs_parameter_init(params.as_mut_ptr());
            params.assume_init()
        };
        params.m = self.opt.memory;
        params.epsilon = self.opt.epsilon;
        params.past = self.opt.past;
        params.delta = self.opt.delta;
        params.max_iterations = self.opt.max_iterations;

        let w = unsafe { lbfgs_malloc(k as i32) };
        if w.is_null() {
            return Err(Error::Training("lbfgs_malloc failed".to_string()));
        }
        unsafe { std::ptr::write_bytes(w, 0, k) };

        let mut state = FitState {
            encoder: &self.encoder,
            ds,
            vocab,
            pool: &self.pool,
            c2: self.opt.c2,
            checkpoint: self.opt.checkpoint.as_ref(),
        };
        let mut fx = 0.0;
        let r = unsafe {
            lbfgs(
                k as i32,
                w,
                &mut fx,
                Some(proc_evaluate),
                Some(proc_progress),
                &mut state as *mut FitState as *mut c_void,
                &mut params,
            )
        };
        let weights = unsafe { std::slice::from_raw_parts(w, k) }.to_vec();
        unsafe { lbfgs_free(w) };

        if r < 0 {
            let msg = unsafe { CStr::from_ptr(lbfgs_strerror(r)) };
            return Err(Error::Training(format!(
                "lbfgs terminated with status {}: {}",
                r,
                msg.to_string_lossy()
            )));
        }
        log::info!("lbfgs finished (status {}), final loss: {:.6}", r, fx);
        Ok(self.encoder.snapshot(&weights, vocab))
    }
}
