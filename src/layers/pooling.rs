use ndarray::Array3;

/// Max pooling over the time axis with stride equal to the pool size.
/// Trailing steps that do not fill a whole window are dropped.
#[derive(Clone, Debug)]
pub struct MaxPool1d {
    pub pool_size: usize,
}

/// Index of the winning input step for every pooled output
#[derive(Clone, Debug)]
pub struct MaxPool1dCache {
    argmax: Array3<usize>,
    input_length: usize,
}

impl MaxPool1d {
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "Pool size must be positive");
        MaxPool1d { pool_size }
    }

    pub fn output_length(&self, input_length: usize) -> usize {
        input_length / self.pool_size
    }

    pub fn forward(&self, input: &Array3<f64>) -> Array3<f64> {
        self.forward_with_cache(input).0
    }

    pub fn forward_with_cache(&self, input: &Array3<f64>) -> (Array3<f64>, MaxPool1dCache) {
        let (batch, channels, len) = input.dim();
        let out_len = self.output_length(len);
        let mut output = Array3::zeros((batch, channels, out_len));
        let mut argmax = Array3::zeros((batch, channels, out_len));

        for b in 0..batch {
            for c in 0..channels {
                for t in 0..out_len {
                    let start = t * self.pool_size;
                    let mut best = start;
                    for k in start + 1..start + self.pool_size {
                        if input[[b, c, k]] > input[[b, c, best]] {
                            best = k;
                        }
                    }
                    output[[b, c, t]] = input[[b, c, best]];
                    argmax[[b, c, t]] = best;
                }
            }
        }

        (output, MaxPool1dCache { argmax, input_length: len })
    }

    /// Routes each output gradient to the input step that won the max
    pub fn backward(&self, grad_output: &Array3<f64>, cache: &MaxPool1dCache) -> Array3<f64> {
        let (batch, channels, out_len) = grad_output.dim();
        let mut grad_input = Array3::zeros((batch, channels, cache.input_length));

        for b in 0..batch {
            for c in 0..channels {
                for t in 0..out_len {
                    grad_input[[b, c, cache.argmax[[b, c, t]]]] += grad_output[[b, c, t]];
                }
            }
        }
        grad_input
    }
}
