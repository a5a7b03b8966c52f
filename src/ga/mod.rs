//! The JEGA (Multi-Objective Genetic Algorithm) engine: population,
//! operator set, convergence tracking, niche pressure, replacement
//! strategies, and the driver state machine tying them together.

pub mod convergence;
pub mod driver;
pub mod niching;
pub mod operator;
pub mod population;
pub mod selection;
