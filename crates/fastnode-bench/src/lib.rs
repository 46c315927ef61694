#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! Benchmark harness for fastnode.
//!
//! Run benchmarks with: `cargo bench -p fastnode-bench`
//!
//! This crate is intentionally minimal - it exists to hold criterion benchmarks
//! and establish a performance measurement culture from day one.
