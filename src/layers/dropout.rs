use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand_distr::Uniform;

/// Inverted dropout applied between recurrent layers.
///
/// The layer itself is stateless apart from the train/eval flag: every call to
/// `forward` draws a fresh mask and hands it back so the caller can keep it in
/// its cache for the backward pass. Recurrent stacks call it once per time
/// step, so each step gets an independent mask.
#[derive(Clone, Debug)]
pub struct Dropout {
    pub dropout_rate: f64,
    pub is_training: bool,
}

impl Dropout {
    pub fn new(dropout_rate: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&dropout_rate),
            "Dropout rate must be in [0.0, 1.0)"
        );

        Dropout {
            dropout_rate,
            is_training: true,
        }
    }

    pub fn train(&mut self) {
        self.is_training = true;
    }

    pub fn eval(&mut self) {
        self.is_training = false;
    }

    /// Returns the dropped activations and the mask that produced them.
    /// The mask is `None` in eval mode or when the rate is zero.
    pub fn forward(&self, input: &Array2<f64>) -> (Array2<f64>, Option<Array2<f64>>) {
        if !self.is_training || self.dropout_rate == 0.0 {
            return (input.clone(), None);
        }

        let keep_prob = 1.0 - self.dropout_rate;
        let mask = Array2::random(input.raw_dim(), Uniform::new(0.0, 1.0))
            .mapv(|x| if x < keep_prob { 1.0 } else { 0.0 });

        (input * &mask / keep_prob, Some(mask))
    }

    pub fn backward(&self, grad_output: &Array2<f64>, mask: Option<&Array2<f64>>) -> Array2<f64> {
        match mask {
            Some(mask) => grad_output * mask / (1.0 - self.dropout_rate),
            None => grad_output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_dropout_eval_is_identity() {
        let mut dropout = Dropout::new(0.5);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0]]);

        dropout.eval();
        let (output, mask) = dropout.forward(&input);
        assert_eq!(output, input);
        assert!(mask.is_none());
    }

    #[test]
    fn test_dropout_train_scales_kept_units() {
        let dropout = Dropout::new(0.5);
        let input = Array2::ones((20, 5));

        let (output, mask) = dropout.forward(&input);
        let mask = mask.unwrap();

        for (out, m) in output.iter().zip(mask.iter()) {
            if *m == 1.0 {
                assert!((out - 2.0).abs() < 1e-12);
            } else {
                assert_eq!(*out, 0.0);
            }
        }
    }

    #[test]
    fn test_dropout_backward_uses_mask() {
        let dropout = Dropout::new(0.2);
        let grad = arr2(&[[1.0, 1.0]]);
        let mask = arr2(&[[1.0, 0.0]]);

        let back = dropout.backward(&grad, Some(&mask));
        assert!((back[[0, 0]] - 1.25).abs() < 1e-12);
        assert_eq!(back[[0, 1]], 0.0);
        assert_eq!(dropout.backward(&grad, None), grad);
    }
}
