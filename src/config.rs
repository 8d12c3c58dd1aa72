use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches};
use num_cpus;

/// The full configuration surface. Hyperparameter lists default to their
/// single-value defaults when not given on the command line.
pub struct Options {
    pub input: PathBuf,
    pub validate: Option<PathBuf>,
    pub momentum: f64,
    pub ratios: Vec<f64>,
    pub batches: Vec<f64>,
    pub hiddens: Vec<usize>,
    pub generations: f64,
    pub stop: f64,
    pub save: Option<PathBuf>,
    pub dump: bool,
    pub threads: usize,
}

impl Options {
    pub fn from_args() -> Result<Options> {
        let default_threads = num_cpus::get().to_string();

        let matches = App::new("mlp-grid")
            .about("Parallel hyperparameter grid search for an MLP digit classifier")
            .arg(
                Arg::with_name("input")
                    .required(true)
                    .help("training dataset, CSV: label,pixel_0,...,pixel_783"),
            )
            .arg(
                Arg::with_name("momentum")
                    .long("momentum")
                    .takes_value(true)
                    .default_value("0.0001")
                    .help("momentum coefficient"),
            )
            .arg(
                Arg::with_name("ratio")
                    .long("ratio")
                    .takes_value(true)
                    .multiple(true)
                    .help("learning rates to search (default 0.1)"),
            )
            .arg(
                Arg::with_name("batch")
                    .long("batch")
                    .takes_value(true)
                    .multiple(true)
                    .help("batch sizes to search, inf = full batch (default 10)"),
            )
            .arg(
                Arg::with_name("hidden")
                    .long("hidden")
                    .takes_value(true)
                    .multiple(true)
                    .help("hidden layer widths to search (default 100)"),
            )
            .arg(
                Arg::with_name("generations")
                    .long("generations")
                    .takes_value(true)
                    .default_value("inf")
                    .help("maximum generations per run"),
            )
            .arg(
                Arg::with_name("stop")
                    .long("stop")
                    .takes_value(true)
                    .allow_hyphen_values(true)
                    .default_value("-inf")
                    .help("validation error threshold for early stop"),
            )
            .arg(
                Arg::with_name("validate")
                    .long("validate")
                    .takes_value(true)
                    .help("validation dataset path"),
            )
            .arg(
                Arg::with_name("save")
                    .long("save")
                    .takes_value(true)
                    .help("directory for error trajectory artifacts"),
            )
            .arg(
                Arg::with_name("no-dump")
                    .long("no-dump")
                    .help("silence per-generation console output"),
            )
            .arg(
                Arg::with_name("threads")
                    .long("threads")
                    .takes_value(true)
                    .default_value(&default_threads)
                    .help("worker pool size"),
            )
            .get_matches();

        return Options::from_matches(&matches);
    }

    fn from_matches(matches: &ArgMatches) -> Result<Options> {
        return Ok(Options {
            input: PathBuf::from(matches.value_of("input").unwrap()),
            validate: matches.value_of("validate").map(PathBuf::from),
            momentum: parse_value(matches, "momentum")?,
            ratios: parse_f64_list(matches, "ratio", 0.1)?,
            batches: parse_f64_list(matches, "batch", 10.0)?,
            hiddens: parse_usize_list(matches, "hidden", 100)?,
            generations: parse_generations(matches)?,
            stop: parse_value(matches, "stop")?,
            save: matches.value_of("save").map(PathBuf::from),
            dump: !matches.is_present("no-dump"),
            threads: parse_value(matches, "threads")?,
        });
    }
}

/// Finite generation budgets are whole counts; truncate fractional input.
fn parse_generations(matches: &ArgMatches) -> Result<f64> {
    let generations: f64 = parse_value(matches, "generations")?;
    if generations.is_finite() {
        return Ok(generations.trunc());
    }
    return Ok(generations);
}

fn parse_value<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: ::std::str::FromStr,
    T::Err: ::std::error::Error + Send + Sync + 'static,
{
    let raw = matches.value_of(name).unwrap();
    return raw
        .parse()
        .with_context(|| format!("invalid value for --{}: {:?}", name, raw));
}

fn parse_f64_list(matches: &ArgMatches, name: &str, default: f64) -> Result<Vec<f64>> {
    match matches.values_of(name) {
        Some(values) => {
            let mut parsed = Vec::new();
            for raw in values {
                parsed.push(
                    raw.parse()
                        .with_context(|| format!("invalid value for --{}: {:?}", name, raw))?,
                );
            }
            return Ok(parsed);
        }
        None => return Ok(vec![default]),
    }
}

fn parse_usize_list(matches: &ArgMatches, name: &str, default: usize) -> Result<Vec<usize>> {
    match matches.values_of(name) {
        Some(values) => {
            let mut parsed = Vec::new();
            for raw in values {
                parsed.push(
                    raw.parse()
                        .with_context(|| format!("invalid value for --{}: {:?}", name, raw))?,
                );
            }
            return Ok(parsed);
        }
        None => return Ok(vec![default]),
    }
}
