//! Subprocess harness driving the `swarmcp` binary for end-to-end tests.

pub mod harness;
