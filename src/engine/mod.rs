mod client;

pub use client::{ExecutionEngine, HttpExecutionEngine};
