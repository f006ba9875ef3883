pub mod event;
pub mod records;
pub mod strategy;

pub use event::*;
pub use records::*;
pub use strategy::*;
