use dataset::Sample;
use math::{Matrix, Vector};

pub const N_INPUTS: usize = 28 * 28;
pub const N_OUTPUTS: usize = 10;

/// Logistic sigmoid. f64 saturates cleanly for large |x| (exp overflow gives
/// inf, so the result limits to 0.0 or 1.0 instead of failing).
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative expressed through the already-activated output.
#[allow(dead_code)]
pub fn sigmoid_derivative(o: f64) -> f64 {
    o * (1.0 - o)
}

fn nan_to_num(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    if x == f64::INFINITY {
        return f64::MAX;
    }
    if x == f64::NEG_INFINITY {
        return f64::MIN;
    }
    return x;
}

/// A feed-forward network as an ordered chain of layer weight matrices.
/// Matrix l has shape (nodes[l] + 1, nodes[l + 1]); row 0 is the bias row.
pub struct Network {
    pub weights: Vec<Matrix>,
}

impl Network {
    pub fn new(nodes: &[usize]) -> Self {
        let mut weights = Vec::with_capacity(nodes.len() - 1);
        for i in 0..nodes.len() - 1 {
            weights.push(Matrix::new(nodes[i] + 1, nodes[i + 1]).init_randn());
        }

        return Network { weights: weights };
    }

    /// Forward pass. Returns every layer's activated output in order; the
    /// last entry is the prediction.
    pub fn forward(&self, input: &Vector) -> Vec<Vector> {
        let mut outputs: Vec<Vector> = Vec::with_capacity(self.weights.len());

        for w in &self.weights {
            let mut out = Vector::new(w.cols).init_with(0.0);
            {
                let layer_input = match outputs.last() {
                    Some(prev) => prev,
                    None => input,
                };
                w.bias_dot_vec(layer_input, &mut out);
            }
            out.apply(sigmoid);
            outputs.push(out);
        }

        return outputs;
    }

    /// Per-layer error gradients. The output layer's gradient is simply
    /// `predicted - target`; each earlier layer's gradient is the next
    /// layer's weights (bias row excluded) applied to the next gradient.
    /// Inner gradients are deliberately not scaled by the activation
    /// derivative; downstream consumers rely on this exact rule.
    pub fn gradients(&self, target: &Vector, outputs: &[Vector]) -> Vec<Vector> {
        let layers = self.weights.len();
        let mut grads: Vec<Vector> = Vec::with_capacity(layers);
        for w in &self.weights {
            grads.push(Vector::new(w.cols).init_with(0.0));
        }

        let predict = &outputs[layers - 1];
        let mut last = Vector::new(predict.rows).init_with(0.0);
        for i in 0..predict.rows {
            last.mem[i] = predict.mem[i] - target.mem[i];
        }
        grads[layers - 1] = last;

        for i in (0..layers - 1).rev() {
            let (head, tail) = grads.split_at_mut(i + 1);
            self.weights[i + 1].carry_grad_back(&tail[0], &mut head[i]);
        }

        return grads;
    }

    /// Adds each layer's outer-product weight delta into `accum`. The layer
    /// input chains from the original input through each forward output.
    pub fn accumulate_deltas(
        &self,
        input: &Vector,
        grads: &[Vector],
        outputs: &[Vector],
        accum: &mut [Matrix],
    ) {
        for l in 0..self.weights.len() {
            let layer_input = if l == 0 { input } else { &outputs[l - 1] };
            accum[l].add_bias_outer(layer_input, &grads[l]);
        }
    }

    /// Fraction of samples whose predicted argmax disagrees with the target
    /// argmax.
    pub fn error_rate(&self, data: &[Sample]) -> f64 {
        let mut count = 0usize;

        for sample in data {
            let outputs = self.forward(&sample.input);
            let (predicted, _) = outputs[outputs.len() - 1].max_component();
            let (expected, _) = sample.target.max_component();
            if predicted != expected {
                count += 1;
            }
        }

        return count as f64 / data.len() as f64;
    }

    /// Cross-entropy-like diagnostic cost. The prediction is renormalized to
    /// sum to 1.0 when its sum is positive (not a softmax); zero-target
    /// entries score ln(1 - p) clamped to finite values, one-target entries
    /// score t * ln(p). Summed, negated and averaged over the dataset.
    pub fn cost(&self, data: &[Sample]) -> f64 {
        let mut accum = 0.0f64;

        for sample in data {
            let outputs = self.forward(&sample.input);
            let predict = &outputs[outputs.len() - 1];

            let psum = predict.calc_sum();

            for i in 0..predict.rows {
                let p = if psum > 0.0 {
                    predict.mem[i] / psum
                } else {
                    predict.mem[i]
                };

                let score = if sample.target.mem[i] == 0.0 {
                    nan_to_num((1.0 - p).ln())
                } else {
                    sample.target.mem[i] * p.ln()
                };

                accum -= score;
            }
        }

        return accum / data.len() as f64;
    }
}
