//! Finite element assembly and time stepping of coupled two-phase (water/oil) flow in a
//! deformable porous medium.
//!
//! The velocity is discretized with lowest-order Raviart-Thomas elements, the pressure with
//! piecewise constants and the water saturation and each displacement component with continuous
//! piecewise linear elements on a triangle mesh. Every time step assembles one 5x5 block system
//! for `[v, p, s, u_0, u_1]`, solved within a Picard iteration.
pub mod assembly;
pub mod coefficient;
pub mod connectivity;
pub mod function;
pub mod mesh;
pub mod model;
pub mod quadrature;
pub mod simulation;
pub mod solver;
pub mod space;
pub mod state;
pub mod system;
pub mod timeline;
pub mod util;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
