pub mod cascade_localizer;
pub mod haar_cascade;
pub mod integral_image;
mod math;
