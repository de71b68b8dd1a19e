// Re-export all model types for ease of use

pub mod file;
pub mod principal;
pub mod subject;
pub mod responses;

pub use file::*;
pub use principal::*;
pub use subject::*;
pub use responses::*;
