use std::collections::HashSet;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::thread::spawn;

use trainer;
use trainer::TrainerContext;

/// One unit of grid-search work. `batch` may be infinite for full-batch
/// descent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Experiment {
    pub ratio: f64,
    pub batch: f64,
    pub hidden: usize,
}

/// Builds the experiment list: exactly one combination when every list is a
/// singleton, the full Cartesian product otherwise. Duplicates are dropped
/// afterwards, keeping first-seen order.
pub fn build_experiments(ratios: &[f64], batches: &[f64], hiddens: &[usize]) -> Vec<Experiment> {
    let mut experiments = Vec::new();

    if ratios.len() == 1 && batches.len() == 1 && hiddens.len() == 1 {
        experiments.push(Experiment {
            ratio: ratios[0],
            batch: batches[0],
            hidden: hiddens[0],
        });
    } else {
        for &ratio in ratios {
            for &batch in batches {
                for &hidden in hiddens {
                    experiments.push(Experiment {
                        ratio: ratio,
                        batch: batch,
                        hidden: hidden,
                    });
                }
            }
        }
    }

    return dedupe(experiments);
}

/// Exact-value dedupe; floats compare by bit pattern so 0.1 only ever equals
/// itself.
fn dedupe(experiments: Vec<Experiment>) -> Vec<Experiment> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(experiments.len());

    for exp in experiments {
        if seen.insert((exp.ratio.to_bits(), exp.batch.to_bits(), exp.hidden)) {
            unique.push(exp);
        }
    }

    return unique;
}

/// Dispatches every experiment across `threads` workers, one in-flight task
/// per worker, and blocks until the whole grid has finished. Workers share
/// the context (datasets, config, console lock, interrupt flag) through one
/// Arc; the job channel carries only the experiment and its position.
pub fn run(experiments: Vec<Experiment>, ctx: Arc<TrainerContext>, threads: usize) {
    let total = experiments.len();
    let (job_sender, job_receiver) = channel();
    let job_receiver = Arc::new(Mutex::new(job_receiver));

    info!("dispatching {} experiments across {} workers", total, threads);

    let mut join_handles = Vec::new();
    for worker_no in 0..threads {
        let ctx = ctx.clone();
        let job_receiver = job_receiver.clone();

        let jh = spawn(move || {
            loop {
                let next_job = { job_receiver.lock().unwrap().recv() };
                match next_job {
                    Ok((exp, pos)) => {
                        debug!("worker {} starting experiment {} / {}", worker_no, pos + 1, total);
                        trainer::run_experiment(&ctx, exp, pos, total);
                    }
                    Err(_) => {
                        debug!("worker {} exiting", worker_no);
                        break;
                    }
                }
            }
        });
        join_handles.push(jh);
    }

    for (pos, exp) in experiments.into_iter().enumerate() {
        job_sender.send((exp, pos)).unwrap();
    }
    drop(job_sender);

    for jh in join_handles {
        jh.join().unwrap();
    }
}
