#![forbid(unsafe_code)]

pub mod model;
pub mod policy;
pub mod sequencer;
pub mod time;
pub mod timer;

pub use time::Clock;
