//! Assembly of global matrices and vectors from cell and face integrals.
pub mod face;
pub mod global;
pub mod local;
