#![forbid(unsafe_code)]

pub mod matching;
pub mod model;
pub mod percent;
pub mod quiz;
pub mod time;
pub mod traversal;
pub mod unlock;

pub use time::Clock;
