use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use math::Vector;
use network::{N_INPUTS, N_OUTPUTS};

/// One labeled image: 784 pixel intensities normalized to [0, 1] and a
/// one-hot target over the 10 digit classes. Never mutated after load.
pub struct Sample {
    pub input: Vector,
    pub target: Vector,
}

/// Reads a comma-separated dataset: `label,pixel_0,...,pixel_783` per line,
/// label in [0, 9], pixels in [0, 255]. Any malformed record aborts the whole
/// load; a partial dataset is never returned. Document order is preserved.
pub fn load_csv(path: &Path) -> Result<Vec<Sample>> {
    let file =
        File::open(path).with_context(|| format!("failed to open dataset {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut data = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line =
            line.with_context(|| format!("failed to read {}:{}", path.display(), line_no))?;

        data.push(
            parse_record(&line)
                .with_context(|| format!("bad record at {}:{}", path.display(), line_no))?,
        );
    }

    return Ok(data);
}

fn parse_record(line: &str) -> Result<Sample> {
    let mut fields = line.split(',');

    let label_field = fields.next().context("empty record")?;
    let label: usize = label_field
        .trim()
        .parse()
        .with_context(|| format!("non-numeric label {:?}", label_field))?;
    ensure!(label < N_OUTPUTS, "label {} out of range 0..{}", label, N_OUTPUTS);

    let mut input = Vector::new(N_INPUTS);
    for field in fields {
        let value: f64 = field
            .trim()
            .parse()
            .with_context(|| format!("non-numeric pixel {:?}", field))?;
        input.mem.push(value / 255.0);
    }
    ensure!(
        input.mem.len() == N_INPUTS,
        "expected {} pixels, got {}",
        N_INPUTS,
        input.mem.len()
    );

    let mut target = Vector::new(N_OUTPUTS).init_with(0.0);
    target.mem[label] = 1.0;

    return Ok(Sample {
        input: input,
        target: target,
    });
}
