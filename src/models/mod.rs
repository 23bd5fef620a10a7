/// Module for stacked LSTM networks.
pub mod lstm_network;

/// The Conv1D/LSTM/BiLSTM temperature forecaster.
pub mod forecast_model;
