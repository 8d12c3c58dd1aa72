use rand;
use rand::distributions::{IndependentSample, Normal};
use std::fmt;

/// Row-major matrix. For a layer transition this is laid out with one row per
/// input unit plus a leading bias row (row 0, fed by an implicit input of 1.0)
/// and one column per output unit.
#[derive(Debug, Clone)]
pub struct Matrix {
    pub mem: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        return Self {
            mem: Vec::with_capacity(cols * rows),
            rows: rows,
            cols: cols,
        };
    }

    pub fn init_with(mut self, val: f64) -> Self {
        for _ in 0..self.rows * self.cols {
            self.mem.push(val);
        }

        return self;
    }

    /// Independent standard-normal draws for every weight.
    pub fn init_randn(mut self) -> Self {
        let mut rng = rand::thread_rng();
        let normal = Normal::new(0.0, 1.0);

        for _ in 0..self.rows * self.cols {
            self.mem.push(normal.ind_sample(&mut rng));
        }

        return self;
    }

    #[allow(dead_code)]
    pub fn fill_with(&mut self, val: f64) {
        for i in 0..self.rows * self.cols {
            self.mem[i] = val;
        }
    }

    /// Weighted sum of `vec` against this matrix with the bias row applied:
    /// res[c] = mem[0][c] + sum_r vec[r] * mem[r + 1][c].
    pub fn bias_dot_vec(&self, vec: &Vector, res: &mut Vector) {
        assert!(
            self.rows == vec.rows + 1 && self.cols == res.rows,
            "Dimensions invalid for bias product: \
             Matrix {}x{} * Vector (1 + {})x1 = Vector {}x1",
            self.rows,
            self.cols,
            vec.rows,
            res.rows
        );

        for col in 0..self.cols {
            res.mem[col] = self.mem[col];
        }

        for row in 0..vec.rows {
            let mat_row_start = (row + 1) * self.cols;
            for col in 0..self.cols {
                res.mem[col] += self.mem[mat_row_start + col] * vec.mem[row];
            }
        }
    }

    /// Applies the matrix, bias row excluded, to a downstream gradient:
    /// res[r] = sum_c mem[r + 1][c] * grad[c].
    pub fn carry_grad_back(&self, grad: &Vector, res: &mut Vector) {
        assert!(
            self.rows == res.rows + 1 && self.cols == grad.rows,
            "Dimensions invalid for gradient carry: \
             Matrix {}x{} * Vector {}x1 = Vector {}x1",
            self.rows,
            self.cols,
            grad.rows,
            res.rows
        );

        for row in 0..res.rows {
            let mat_row_start = (row + 1) * self.cols;
            res.mem[row] = 0.0;
            for col in 0..self.cols {
                res.mem[row] += self.mem[mat_row_start + col] * grad.mem[col];
            }
        }
    }

    /// Accumulates outer(prepend(1.0, input), grad) into this matrix.
    pub fn add_bias_outer(&mut self, input: &Vector, grad: &Vector) {
        assert!(
            self.rows == input.rows + 1 && self.cols == grad.rows,
            "Dimensions invalid for outer accumulate: \
             {}x{} += (1 + {})x1 * 1x{}",
            self.rows,
            self.cols,
            input.rows,
            grad.rows
        );

        for col in 0..self.cols {
            self.mem[col] += grad.mem[col];
        }

        for row in 0..input.rows {
            let mat_row_start = (row + 1) * self.cols;
            for col in 0..self.cols {
                self.mem[mat_row_start + col] += input.mem[row] * grad.mem[col];
            }
        }
    }
}

const WRITE_ERR: &str = "Failed to write";

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matrix {}x{}:\n", self.rows, self.cols).expect(&WRITE_ERR);
        for row in 0..self.rows {
            let row_start = row * self.cols;
            for col in 0..self.cols {
                write!(f, "{:8.4}", self.mem[row_start + col]).expect(&WRITE_ERR);
            }
            write!(f, "\n").expect(&WRITE_ERR);
        }

        return Ok(());
    }
}

#[derive(Debug, Clone)]
pub struct Vector {
    pub mem: Vec<f64>,
    pub rows: usize,
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Vector {}x1:\n", self.rows).expect(&WRITE_ERR);
        for row in 0..self.rows {
            write!(f, "{:8.4}\n", self.mem[row]).expect(&WRITE_ERR);
        }

        return Ok(());
    }
}

impl Vector {
    pub fn new(rows: usize) -> Self {
        return Self {
            mem: Vec::with_capacity(rows),
            rows: rows,
        };
    }

    pub fn init_with(mut self, val: f64) -> Self {
        for _ in 0..self.rows {
            self.mem.push(val);
        }

        return self;
    }

    #[allow(dead_code)]
    pub fn from_slice(s: &[f64]) -> Self {
        return Self {
            mem: s.to_vec(),
            rows: s.len(),
        };
    }

    pub fn apply<F>(&mut self, f: F)
    where
        F: Fn(f64) -> f64,
    {
        for row in 0..self.rows {
            self.mem[row] = f(self.mem[row]);
        }
    }

    pub fn calc_sum(&self) -> f64 {
        let mut res: f64 = 0.0;
        for i in 0..self.rows {
            res += self.mem[i];
        }
        return res;
    }

    pub fn max_component(&self) -> (usize, f64) {
        let mut max = self.mem[0];
        let mut max_i = 0;

        for i in 1..self.rows {
            let val = self.mem[i];
            if val > max {
                max = val;
                max_i = i;
            }
        }

        return (max_i, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_dot_vec_applies_bias_row() {
        // 2 inputs -> 2 outputs, rows = bias + 2.
        let mut w = Matrix::new(3, 2).init_with(0.0);
        w.mem = vec![
            0.5, -0.5, // bias row
            1.0, 0.0, // input 0
            0.0, 2.0, // input 1
        ];

        let inp = Vector::from_slice(&[3.0, 4.0]);
        let mut out = Vector::new(2).init_with(0.0);
        w.bias_dot_vec(&inp, &mut out);

        assert_relative_eq!(out.mem[0], 0.5 + 3.0);
        assert_relative_eq!(out.mem[1], -0.5 + 8.0);
    }

    #[test]
    fn carry_grad_back_skips_bias_row() {
        let mut w = Matrix::new(3, 2).init_with(0.0);
        w.mem = vec![
            100.0, 100.0, // bias row must not contribute
            1.0, 2.0,
            3.0, 4.0,
        ];

        let grad = Vector::from_slice(&[0.5, -1.0]);
        let mut res = Vector::new(2).init_with(0.0);
        w.carry_grad_back(&grad, &mut res);

        assert_relative_eq!(res.mem[0], 0.5 * 1.0 - 1.0 * 2.0);
        assert_relative_eq!(res.mem[1], 0.5 * 3.0 - 1.0 * 4.0);
    }

    #[test]
    fn add_bias_outer_prepends_one() {
        let mut accum = Matrix::new(3, 2).init_with(0.0);
        let inp = Vector::from_slice(&[2.0, -1.0]);
        let grad = Vector::from_slice(&[0.25, 0.5]);

        accum.add_bias_outer(&inp, &grad);
        accum.add_bias_outer(&inp, &grad);

        // Bias row accumulates the raw gradient twice.
        assert_relative_eq!(accum.mem[0], 0.5);
        assert_relative_eq!(accum.mem[1], 1.0);
        assert_relative_eq!(accum.mem[2], 2.0 * 0.25 * 2.0);
        assert_relative_eq!(accum.mem[5], -1.0 * 0.5 * 2.0);
    }

    #[test]
    fn max_component_picks_first_of_ties() {
        let v = Vector::from_slice(&[0.3, 0.9, 0.9, 0.1]);
        let (i, val) = v.max_component();
        assert_eq!(i, 1);
        assert_relative_eq!(val, 0.9);
    }

    #[test]
    fn init_randn_fills_every_cell() {
        let m = Matrix::new(5, 4).init_randn();
        assert_eq!(m.mem.len(), 20);
        assert!(m.mem.iter().all(|v| v.is_finite()));
    }
}
