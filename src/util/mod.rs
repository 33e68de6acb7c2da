pub mod clock;
pub mod vec3;
