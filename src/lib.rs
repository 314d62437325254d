//! Strandr - primer design and reference resolution on a composable task engine
//!
//! Work is expressed as trees of tasks: a composite task prepares subtasks,
//! folds their reports back in as they finish, and may fan out further along
//! the way. The thermodynamic and dimer modules are plain functions used by
//! the primer design tasks.

pub mod dimer;
pub mod error;
pub mod id;
pub mod primer;
pub mod reference;
pub mod scheduler;
pub mod sequence;
pub mod task;
pub mod thermo;
pub mod unwanted;

pub use error::{Result, StrandrError};
