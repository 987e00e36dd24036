//! Face localization, age labelling and annotation for still images,
//! video files and live frame streams.

pub mod annotation;
pub mod classification;
pub mod detection;
pub mod pipeline;
pub mod shared;
pub mod video;
