use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time;

use rand;
use rand::Rng;

use dataset::Sample;
use math::Matrix;
use network::{Network, N_INPUTS, N_OUTPUTS};
use scheduler::Experiment;

/// Read-only state shared by every worker: the datasets, the run
/// configuration and the console lock. Built once before dispatch; workers
/// receive only the small per-task experiment tuple through the job channel.
pub struct TrainerContext {
    pub train: Arc<Vec<Sample>>,
    pub validate: Arc<Vec<Sample>>,
    pub has_validate: bool,
    pub momentum: f64,
    pub generations: f64,
    pub stop: f64,
    pub dump: bool,
    pub save: Option<PathBuf>,
    pub console: Mutex<()>,
    pub interrupted: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StopReason {
    Converged,
    ExhaustedGenerations,
    Interrupted,
}

/// One gradient-descent run over a single hyperparameter combination. Owns
/// its network exclusively; the only shared resource it touches is the
/// console lock.
struct Trainer<'a> {
    ctx: &'a TrainerContext,
    ratio: f64,
    batch: f64,
    batch_limit: usize,
    hidden: usize,
    label: String,
    network: Network,
    previous: Vec<Matrix>,
    accum: Vec<Matrix>,
    order: Vec<usize>,
    train_errors: Vec<f64>,
    validate_errors: Vec<f64>,
    generation: usize,
}

pub fn run_experiment(ctx: &TrainerContext, exp: Experiment, pos: usize, total: usize) {
    Trainer::new(ctx, exp, pos, total).run();
}

impl<'a> Trainer<'a> {
    fn new(ctx: &'a TrainerContext, exp: Experiment, pos: usize, total: usize) -> Self {
        // Finite batch sizes are truncated once up front; the truncated value
        // also names the result artifact.
        let batch = if exp.batch.is_finite() {
            exp.batch.trunc()
        } else {
            exp.batch
        };
        let batch_limit = if batch.is_finite() {
            batch as usize
        } else {
            usize::MAX
        };

        let network = Network::new(&[N_INPUTS, exp.hidden, N_OUTPUTS]);
        let previous = network.weights.clone();
        let accum = network
            .weights
            .iter()
            .map(|w| Matrix::new(w.rows, w.cols).init_with(0.0))
            .collect();

        let label = format!(
            "( ratio = {}, batch = {}, hidden = {}, pos = {} / {} )",
            exp.ratio,
            batch,
            exp.hidden,
            pos + 1,
            total
        );

        return Trainer {
            ctx: ctx,
            ratio: exp.ratio,
            batch: batch,
            batch_limit: batch_limit,
            hidden: exp.hidden,
            label: label,
            network: network,
            previous: previous,
            accum: accum,
            order: (0..ctx.train.len()).collect(),
            train_errors: Vec::new(),
            validate_errors: Vec::new(),
            generation: 0,
        };
    }

    fn run(&mut self) {
        let start = time::Instant::now();

        if self.ctx.dump {
            let _console = self.ctx.console.lock().unwrap();
            println!("{}: STARTING", self.label);
        }

        let reason = self.train_loop();
        debug!("{}: stopped as {:?}", self.label, reason);

        self.finalize(start);
    }

    fn train_loop(&mut self) -> StopReason {
        let ctx = self.ctx;

        loop {
            if self.generation as f64 >= ctx.generations {
                return StopReason::ExhaustedGenerations;
            }
            self.generation += 1;

            if ctx.interrupted.load(Ordering::Relaxed) {
                return StopReason::Interrupted;
            }

            let train_error = self.network.error_rate(&ctx.train);
            let validate_error = if ctx.has_validate {
                self.network.error_rate(&ctx.validate)
            } else {
                train_error
            };

            // Convergence is checked before this generation records anything
            // or touches the weights.
            if validate_error <= ctx.stop {
                return StopReason::Converged;
            }

            let train_cost = self.network.cost(&ctx.train).abs();
            let validate_cost = if ctx.has_validate {
                self.network.cost(&ctx.validate).abs()
            } else {
                train_cost
            };

            if ctx.has_validate {
                self.validate_errors.push(validate_error);
            }
            self.train_errors.push(train_error);

            if ctx.dump {
                let _console = ctx.console.lock().unwrap();
                println!(
                    "{}: ITERATION\n  gen {} / {} verr = {:.5} terr = {:.5} \
                     vcost = {:.5} tcost = {:.5}",
                    self.label,
                    self.generation,
                    ctx.generations,
                    validate_error,
                    train_error,
                    validate_cost,
                    train_cost
                );
            }

            self.sweep();
        }
    }

    /// One pass over the (locally reshuffled) training set: accumulate
    /// per-sample weight deltas and apply an update whenever the batch limit
    /// is hit, plus once more for a partial final batch.
    fn sweep(&mut self) {
        let ctx = self.ctx;
        let mut rng = rand::thread_rng();
        rng.shuffle(&mut self.order);

        let total = self.order.len();
        let mut batch_count = 0usize;

        for j in 0..total {
            let sample = &ctx.train[self.order[j]];
            let outputs = self.network.forward(&sample.input);
            let grads = self.network.gradients(&sample.target, &outputs);
            self.network
                .accumulate_deltas(&sample.input, &grads, &outputs, &mut self.accum);

            batch_count += 1;
            if batch_count == self.batch_limit || j + 1 == total {
                self.apply_update(batch_count);
                batch_count = 0;
            }
        }
    }

    /// new = w + momentum * previous - ratio * (accum / batch_count), where
    /// the momentum term is taken from the previous *weights*, not the
    /// previous weight change. Resets the accumulators in the same pass.
    fn apply_update(&mut self, batch_count: usize) {
        let momentum = self.ctx.momentum;
        let scale = self.ratio / batch_count as f64;

        for l in 0..self.network.weights.len() {
            let w = &mut self.network.weights[l];
            let old = &mut self.previous[l];
            let acc = &mut self.accum[l];

            for i in 0..w.mem.len() {
                let updated = w.mem[i] + momentum * old.mem[i] - scale * acc.mem[i];
                old.mem[i] = w.mem[i];
                w.mem[i] = updated;
                acc.mem[i] = 0.0;
            }
        }
    }

    fn finalize(&mut self, start: time::Instant) {
        let ctx = self.ctx;

        if !self.train_errors.is_empty() {
            if let Some(ref dir) = ctx.save {
                let fname = dir.join(format!("{}-{}-{}.txt", self.ratio, self.batch, self.hidden));
                if let Err(err) = self.write_artifact(&fname) {
                    warn!("{}: failed to write {}: {}", self.label, fname.display(), err);
                }
            }
        }

        if ctx.dump {
            let elapsed = start.elapsed();
            let secs = elapsed.as_secs() as f64 + f64::from(elapsed.subsec_nanos()) / 1e9;

            let _console = ctx.console.lock().unwrap();
            println!(
                "{}: ENDING\n  time = {:.5}s generations = {}",
                self.label, secs, self.generation
            );
        }
    }

    /// Line 1: per-generation training errors. Line 2 (only when a validation
    /// set was configured): per-generation validation errors.
    fn write_artifact(&self, fname: &Path) -> ::std::io::Result<()> {
        let mut file = File::create(fname)?;

        writeln!(file, "{}", join_values(&self.train_errors))?;
        if self.ctx.has_validate {
            writeln!(file, "{}", join_values(&self.validate_errors))?;
        }

        return Ok(());
    }
}

fn join_values(values: &[f64]) -> String {
    let strings: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    return strings.join(" ");
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::Vector;
    use tempfile;

    fn make_sample(seed: f64, hot: usize) -> Sample {
        let mut input = Vector::new(N_INPUTS);
        for i in 0..N_INPUTS {
            input.mem.push(((i as f64 * seed).sin() + 1.0) / 2.0);
        }
        let mut target = Vector::new(N_OUTPUTS).init_with(0.0);
        target.mem[hot] = 1.0;
        Sample {
            input: input,
            target: target,
        }
    }

    fn tiny_dataset() -> Arc<Vec<Sample>> {
        Arc::new(vec![make_sample(0.37, 0), make_sample(0.91, 1)])
    }

    fn make_ctx(generations: f64) -> TrainerContext {
        let train = tiny_dataset();
        TrainerContext {
            train: train.clone(),
            validate: train,
            has_validate: false,
            momentum: 0.0,
            generations: generations,
            stop: ::std::f64::NEG_INFINITY,
            dump: false,
            save: None,
            console: Mutex::new(()),
            interrupted: AtomicBool::new(false),
        }
    }

    fn experiment(batch: f64) -> Experiment {
        Experiment {
            ratio: 0.1,
            batch: batch,
            hidden: 3,
        }
    }

    #[test]
    fn runs_exactly_the_generation_budget() {
        let ctx = make_ctx(5.0);
        let mut trainer = Trainer::new(&ctx, experiment(::std::f64::INFINITY), 0, 1);
        trainer.run();

        assert_eq!(trainer.generation, 5);
        assert_eq!(trainer.train_errors.len(), 5);
        assert!(trainer.train_errors.iter().all(|&e| e >= 0.0 && e <= 1.0));
        assert!(trainer.validate_errors.is_empty());
    }

    #[test]
    fn reachable_stop_threshold_ends_before_recording() {
        let mut ctx = make_ctx(100.0);
        // Any real error rate is <= 1.0, so this converges on generation 1.
        ctx.stop = 1.0;

        let mut trainer = Trainer::new(&ctx, experiment(::std::f64::INFINITY), 0, 1);
        trainer.run();

        assert_eq!(trainer.generation, 1);
        assert!(trainer.train_errors.is_empty());
    }

    #[test]
    fn full_batch_without_momentum_is_plain_gradient_descent() {
        let ctx = make_ctx(1.0);
        let mut trainer = Trainer::new(&ctx, experiment(::std::f64::INFINITY), 0, 1);

        let before = Network {
            weights: trainer.network.weights.clone(),
        };
        trainer.run();

        // Expected: w - ratio * mean(delta) over the whole dataset, computed
        // from the pre-update weights. Order of the shuffled sweep cannot
        // matter for a single full batch of two samples.
        let mut expected: Vec<Matrix> = before
            .weights
            .iter()
            .map(|w| Matrix::new(w.rows, w.cols).init_with(0.0))
            .collect();
        for sample in ctx.train.iter() {
            let outputs = before.forward(&sample.input);
            let grads = before.gradients(&sample.target, &outputs);
            before.accumulate_deltas(&sample.input, &grads, &outputs, &mut expected);
        }

        let count = ctx.train.len() as f64;
        for l in 0..expected.len() {
            for i in 0..expected[l].mem.len() {
                let want = before.weights[l].mem[i] - 0.1 * expected[l].mem[i] / count;
                assert_relative_eq!(trainer.network.weights[l].mem[i], want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn momentum_term_uses_previous_weights() {
        let mut ctx = make_ctx(1.0);
        ctx.momentum = 0.5;
        let mut trainer = Trainer::new(&ctx, experiment(::std::f64::INFINITY), 0, 1);

        let before = Network {
            weights: trainer.network.weights.clone(),
        };
        trainer.run();

        let mut expected: Vec<Matrix> = before
            .weights
            .iter()
            .map(|w| Matrix::new(w.rows, w.cols).init_with(0.0))
            .collect();
        for sample in ctx.train.iter() {
            let outputs = before.forward(&sample.input);
            let grads = before.gradients(&sample.target, &outputs);
            before.accumulate_deltas(&sample.input, &grads, &outputs, &mut expected);
        }

        // previous == weights on the first update, so the momentum term is
        // 0.5 * the initial weights themselves.
        let count = ctx.train.len() as f64;
        for l in 0..expected.len() {
            for i in 0..expected[l].mem.len() {
                let w0 = before.weights[l].mem[i];
                let want = w0 + 0.5 * w0 - 0.1 * expected[l].mem[i] / count;
                assert_relative_eq!(trainer.network.weights[l].mem[i], want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn preset_interrupt_flag_stops_at_generation_one() {
        let ctx = make_ctx(::std::f64::INFINITY);
        ctx.interrupted.store(true, Ordering::Relaxed);

        let mut trainer = Trainer::new(&ctx, experiment(10.0), 0, 1);
        trainer.run();

        assert_eq!(trainer.generation, 1);
        assert!(trainer.train_errors.is_empty());
    }

    #[test]
    fn artifact_carries_one_line_per_configured_dataset() {
        let dir = tempfile::tempdir().unwrap();

        let mut ctx = make_ctx(3.0);
        ctx.save = Some(dir.path().to_path_buf());
        let mut trainer = Trainer::new(&ctx, experiment(::std::f64::INFINITY), 0, 1);
        trainer.run();

        let path = dir.path().join("0.1-inf-3.txt");
        let contents = ::std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].split_whitespace().count(), 3);

        // With a validation set configured a second trajectory line appears.
        ctx.has_validate = true;
        let mut trainer = Trainer::new(&ctx, experiment(10.0), 0, 1);
        trainer.run();

        let path = dir.path().join("0.1-10-3.txt");
        let contents = ::std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split_whitespace().count(), 3);
        assert_eq!(lines[1].split_whitespace().count(), 3);
    }

    #[test]
    fn no_artifact_without_recorded_generations() {
        let dir = tempfile::tempdir().unwrap();

        let mut ctx = make_ctx(5.0);
        ctx.save = Some(dir.path().to_path_buf());
        ctx.stop = 1.0; // converges immediately, nothing recorded

        let mut trainer = Trainer::new(&ctx, experiment(::std::f64::INFINITY), 0, 1);
        trainer.run();

        assert!(!dir.path().join("0.1-inf-3.txt").exists());
    }
}
