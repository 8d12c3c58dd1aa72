#[macro_use]
extern crate anyhow;
extern crate clap;
extern crate ctrlc;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate num_cpus;
extern crate rand;

#[cfg(test)]
#[macro_use]
extern crate approx;
#[cfg(test)]
extern crate tempfile;

mod config;
mod dataset;
mod math;
mod network;
mod scheduler;
mod trainer;

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use config::Options;
use trainer::TrainerContext;

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = Options::from_args()?;

    let experiments =
        scheduler::build_experiments(&options.ratios, &options.batches, &options.hiddens);

    println!("reading files");
    let train = Arc::new(dataset::load_csv(&options.input)?);
    println!("{} train instances", train.len());

    let validate = match options.validate {
        Some(ref path) => {
            let data = Arc::new(dataset::load_csv(path)?);
            println!("{} validation instances", data.len());
            data
        }
        None => train.clone(),
    };

    let ctx = Arc::new(TrainerContext {
        train: train,
        validate: validate,
        has_validate: options.validate.is_some(),
        momentum: options.momentum,
        generations: options.generations,
        stop: options.stop,
        dump: options.dump,
        save: options.save,
        console: Mutex::new(()),
        interrupted: AtomicBool::new(false),
    });

    // The handler only flips the flag; every trainer observes it at its next
    // generation boundary and finalizes with whatever it has recorded.
    {
        let ctx = ctx.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, stopping runs at their next generation");
            ctx.interrupted.store(true, Ordering::Relaxed);
        })
        .context("failed to install interrupt handler")?;
    }

    scheduler::run(experiments, ctx, options.threads);

    println!("\ndone");
    return Ok(());
}
