pub mod player;
pub mod process_tree;
pub mod processor;
pub mod supervisor;

pub use player::*;
pub use process_tree::{ProcessTree, SystemProcessTree};
pub use processor::*;
pub use supervisor::*;
