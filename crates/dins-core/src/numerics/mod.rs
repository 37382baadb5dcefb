pub mod pseudo_voigt;
pub mod stats;
pub mod stencil;
