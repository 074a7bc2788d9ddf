pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Alice, Bob, Daemon, Enrico, Health, Init, Node, Version};
