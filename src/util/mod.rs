pub mod circle;
pub mod interpolation;
pub mod vec2;
