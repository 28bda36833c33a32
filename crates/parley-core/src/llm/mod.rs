pub mod box_generator;
pub mod generator;
