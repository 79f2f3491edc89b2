//! Play random videos, or random clips of them, through an external player
//! and keep that player on a leash.

pub mod core;
pub mod video;
