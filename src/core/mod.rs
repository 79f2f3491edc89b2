pub mod catalog;
pub mod config;
pub mod error;


pub use catalog::*;
pub use config::*;
pub use error::*;
