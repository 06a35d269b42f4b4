//! Execution drivers: the outer frame driver and the dispatch loop.

mod instruction;
mod main;
