use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use crftrain::{run, Config};

/// Train a linear-chain CRF sequence tagger and evaluate it on a held-out
/// set.
#[derive(Debug, Parser)]
#[command(version)]
struct Argv {
    /// path to training file
    #[arg(long)]
    train: PathBuf,
    /// path to testing file
    #[arg(long)]
    test: PathBuf,
    /// model identifier used by the checkpoint writer
    #[arg(long)]
    modelname: String,
    /// output path for the trained model
    #[arg(long)]
    modelfile: PathBuf,
    /// worker-pool size for gradient computation
    #[arg(long, default_value_t = 4)]
    workers: usize,
    /// write a model snapshot every N optimizer iterations
    #[arg(long)]
    checkpoint_every: Option<usize>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let argv = Argv::parse();
    let default_level = match argv.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    log::debug!("argv: {:?}", argv);

    let cfg = Config {
        train: argv.train,
        test: argv.test,
        model_name: argv.modelname,
        model_file: argv.modelfile,
        workers: argv.workers,
        checkpoint_every: argv.checkpoint_every,
    };
    match run(&cfg) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
