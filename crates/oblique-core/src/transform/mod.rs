pub mod affine;
pub mod deshear;

pub use affine::{affine, affine_into, affine_shape, AffineOptions};
pub use deshear::{deshear, deshear_into, deshear_shape, DeshearOptions};
