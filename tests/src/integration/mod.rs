//! Integration flows for the build-lease pool.

pub mod support;

#[cfg(test)]
mod authorization;
#[cfg(test)]
mod recovery;
