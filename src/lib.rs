#![doc = include_str!("../README.md")]

pub mod broadcast;
pub mod builder;
pub mod deque;
pub mod error;
mod gate;
pub mod queue;
pub mod value;

pub use broadcast::Broadcast;
pub use builder::Builder;
pub use deque::{Deque, End};
pub use error::{Error, Result};
pub use queue::Queue;
pub use value::ValueCell;
