//! Shape adapters between the convolutional and recurrent parts of the model.

use ndarray::{Array2, Array3, Axis};

/// `(batch, channels, length)` -> `(channels * length, batch)`,
/// feature index `c * length + t`.
pub fn flatten(input: &Array3<f64>) -> Array2<f64> {
    let (batch, channels, len) = input.dim();
    let mut output = Array2::zeros((channels * len, batch));
    for (b, sample) in input.axis_iter(Axis(0)).enumerate() {
        for ((c, t), &value) in sample.indexed_iter() {
            output[[c * len + t, b]] = value;
        }
    }
    output
}

/// Inverse of [`flatten`]
pub fn unflatten(input: &Array2<f64>, channels: usize, len: usize) -> Array3<f64> {
    let batch = input.ncols();
    assert_eq!(input.nrows(), channels * len, "Cannot unflatten {} rows into {}x{}", input.nrows(), channels, len);
    let mut output = Array3::zeros((batch, channels, len));
    for b in 0..batch {
        for c in 0..channels {
            for t in 0..len {
                output[[b, c, t]] = input[[c * len + t, b]];
            }
        }
    }
    output
}

/// Feeds the same vector to every step of a sequence
pub fn repeat_vector(input: &Array2<f64>, steps: usize) -> Vec<Array2<f64>> {
    vec![input.clone(); steps]
}

/// Gradient of [`repeat_vector`]: the per-step gradients summed
pub fn repeat_vector_backward(grads: &[Array2<f64>]) -> Array2<f64> {
    let mut iter = grads.iter();
    let first = iter.next().expect("repeat_vector_backward needs at least one step").clone();
    iter.fold(first, |acc, g| acc + g)
}

/// `(batch, steps, features)` -> `(batch, features, steps)` for the convolutions
pub fn to_channels_first(input: &Array3<f64>) -> Array3<f64> {
    input.view().permuted_axes([0, 2, 1]).as_standard_layout().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_flatten_roundtrip_layout() {
        let input = Array3::from_shape_vec((2, 2, 3), (0..12).map(|x| x as f64).collect()).unwrap();
        let flat = flatten(&input);

        assert_eq!(flat.shape(), &[6, 2]);
        assert_eq!(flat[[4, 1]], input[[1, 1, 1]]);
        assert_eq!(unflatten(&flat, 2, 3), input);
    }

    #[test]
    fn test_repeat_vector_backward_sums_steps() {
        let v = arr2(&[[1.0], [2.0]]);
        let steps = repeat_vector(&v, 3);
        assert_eq!(steps.len(), 3);

        let grad = repeat_vector_backward(&steps);
        assert_eq!(grad, arr2(&[[3.0], [6.0]]));
    }

    #[test]
    fn test_channels_first() {
        let input = Array3::from_shape_vec((1, 3, 2), vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]).unwrap();
        let cf = to_channels_first(&input);
        assert_eq!(cf.shape(), &[1, 2, 3]);
        assert_eq!(cf[[0, 1, 2]], 30.0);
    }
}
