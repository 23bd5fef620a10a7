/// Building blocks of the forecasting network.
pub mod lstm_cell;
pub mod bilstm_network;
pub mod conv1d;
pub mod pooling;
pub mod reshape;
pub mod dropout;
pub mod linear;
