pub mod classifier;
pub mod extraction;
pub mod file_lifecycle;
