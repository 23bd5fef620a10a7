use std::path::Path;

use log::info;
use plotters::prelude::*;

use crate::error::{ForecastError, Result};
use crate::training::TrainingMetrics;

fn plot_err<E: std::fmt::Display>(e: E) -> ForecastError {
    ForecastError::Plot(e.to_string())
}

/// Draws the training loss of every epoch (x starts at 1) to an SVG file
pub fn plot_training_loss<P: AsRef<Path>>(history: &[TrainingMetrics], path: P) -> Result<()> {
    let path = path.as_ref();
    if history.is_empty() {
        return Err(ForecastError::Plot("no epochs to plot".to_string()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ForecastError::Io { path: parent.to_path_buf(), source })?;
    }

    let points: Vec<(f64, f64)> = history
        .iter()
        .enumerate()
        .map(|(i, m)| ((i + 1) as f64, m.train_loss))
        .collect();
    let y_max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let y_min = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let pad = ((y_max - y_min) * 0.05).max(1e-6);
    let x_max = (points.len() as f64).max(2.0);

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20i32)
        .x_label_area_size(30u32)
        .y_label_area_size(60u32)
        .build_cartesian_2d(1f64..x_max, (y_min - pad)..(y_max + pad))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc("Loss")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(points, &BLUE))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Wrote loss curve for {} epochs to {}", history.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_plot_writes_svg() {
        let history: Vec<TrainingMetrics> = [0.9, 0.5, 0.4]
            .iter()
            .enumerate()
            .map(|(epoch, &train_loss)| TrainingMetrics { epoch, train_loss, validation_loss: None, time_elapsed: 0.1 })
            .collect();
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots").join("loss.svg");

        plot_training_loss(&history, &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_plot_rejects_empty_history() {
        let dir = tempdir().unwrap();
        assert!(plot_training_loss(&[], dir.path().join("loss.svg")).is_err());
    }
}
