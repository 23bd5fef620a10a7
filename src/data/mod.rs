//! Loading, cleaning and shaping of the weather observations.
pub mod table;
pub mod preprocess;
pub mod daily;
pub mod windowing;
