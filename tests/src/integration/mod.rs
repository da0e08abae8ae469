//! Integration flows across the Courier crates.

pub mod fixtures;

#[cfg(test)]
mod lifecycle;
#[cfg(test)]
mod pubsub;
