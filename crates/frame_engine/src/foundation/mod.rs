//! Foundation types shared by the render modules

pub mod math;
