//! Sliding-window supervised pairs over a daily series.

use log::{debug, warn};
use ndarray::{s, Array1, Array3, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ForecastError, Result};

/// Number of (window, label) pairs a series of `n` rows yields
pub fn window_count(n: usize, window: usize) -> usize {
    n.saturating_sub(window)
}

/// Model inputs and their next-step targets
#[derive(Clone, Debug, PartialEq)]
pub struct WindowedDataset {
    /// `(n, window, features)`
    pub inputs: Array3<f64>,
    pub labels: Array1<f64>,
}

/// Window `i` holds rows `[i, i + window)` of `series` and is labelled with
/// the target feature at row `i + window`.
pub fn sliding_windows(series: ArrayView2<f64>, target: usize, window: usize) -> Result<WindowedDataset> {
    let (rows, features) = series.dim();
    if window == 0 {
        return Err(ForecastError::InvalidConfig("window size must be positive".to_string()));
    }
    if window >= rows {
        return Err(ForecastError::WindowTooLarge { window, len: rows });
    }
    if target >= features {
        return Err(ForecastError::InvalidConfig(format!(
            "target index {} out of range for {} features",
            target, features
        )));
    }

    let count = window_count(rows, window);
    let mut inputs = Array3::zeros((count, window, features));
    for (start, mut sample) in inputs.outer_iter_mut().enumerate() {
        sample.assign(&series.slice(s![start..start + window, ..]));
    }
    let labels = series.slice(s![window.., target]).to_owned();

    debug!("Built {} windows of {} steps over {} features", count, window, features);
    Ok(WindowedDataset { inputs, labels })
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Contiguous split into `[0, boundary)` and `[boundary, n)`.
    ///
    /// A boundary past the end keeps everything for training.
    pub fn split_at(&self, boundary: usize) -> Result<(WindowedDataset, WindowedDataset)> {
        if boundary == 0 {
            return Err(ForecastError::InvalidConfig("split index 0 leaves no training windows".to_string()));
        }
        let boundary = if boundary > self.len() {
            warn!("Split index {} exceeds {} windows, test set will be empty", boundary, self.len());
            self.len()
        } else {
            boundary
        };

        Ok((self.slice_range(0, boundary), self.slice_range(boundary, self.len())))
    }

    fn slice_range(&self, start: usize, end: usize) -> WindowedDataset {
        WindowedDataset {
            inputs: self.inputs.slice(s![start..end, .., ..]).to_owned(),
            labels: self.labels.slice(s![start..end]).to_owned(),
        }
    }

    /// Gathers the windows at `indices`
    pub fn select(&self, indices: &[usize]) -> WindowedDataset {
        WindowedDataset {
            inputs: self.inputs.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Mini-batches of at most `batch_size` windows, shuffled when an RNG is given
    pub fn batches<R: Rng>(&self, batch_size: usize, rng: Option<&mut R>) -> Vec<WindowedDataset> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order.chunks(batch_size.max(1)).map(|chunk| self.select(chunk)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp(rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, 2), |(r, c)| (r * 10 + c) as f64)
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_count(35, 30), 5);
        assert_eq!(window_count(30, 30), 0);
        assert_eq!(window_count(3, 30), 0);
    }

    #[test]
    fn test_thirty_five_days_give_five_pairs() {
        let data = sliding_windows(ramp(35).view(), 0, 30).unwrap();
        assert_eq!(data.inputs.dim(), (5, 30, 2));
        assert_eq!(data.len(), 5);
    }

    #[test]
    fn test_window_and_label_alignment() {
        let series = ramp(8);
        let data = sliding_windows(series.view(), 1, 3).unwrap();

        for i in 0..data.len() {
            assert_eq!(data.inputs.slice(s![i, .., ..]), series.slice(s![i..i + 3, ..]));
            assert_eq!(data.labels[i], series[[i + 3, 1]]);
        }
    }

    #[test]
    fn test_invalid_windows() {
        assert!(matches!(
            sliding_windows(ramp(30).view(), 0, 30),
            Err(ForecastError::WindowTooLarge { window: 30, len: 30 })
        ));
        assert!(matches!(sliding_windows(ramp(5).view(), 0, 0), Err(ForecastError::InvalidConfig(_))));
        assert!(matches!(sliding_windows(ramp(5).view(), 2, 2), Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn test_split_at() {
        let data = sliding_windows(ramp(10).view(), 0, 2).unwrap();

        let (train, test) = data.split_at(6).unwrap();
        assert_eq!((train.len(), test.len()), (6, 2));
        assert_eq!(test.labels[0], data.labels[6]);

        let (train, test) = data.split_at(7300).unwrap();
        assert_eq!((train.len(), test.len()), (8, 0));

        assert!(data.split_at(0).is_err());
    }

    #[test]
    fn test_batches_cover_every_window_once() {
        let data = sliding_windows(ramp(12).view(), 0, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let batches = data.batches(4, Some(&mut rng));
        assert_eq!(batches.iter().map(WindowedDataset::len).collect::<Vec<_>>(), vec![4, 4, 2]);

        let mut labels: Vec<f64> = batches.iter().flat_map(|b| b.labels.to_vec()).collect();
        labels.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(labels, data.labels.to_vec());

        let ordered = data.batches::<StdRng>(4, None);
        assert_eq!(ordered[0].labels, data.labels.slice(s![..4]));
    }
}
