pub const CASCADE_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// TrueType font for labels, fetched into the model cache on first use.
pub const LABEL_FONT_NAME: &str = "Arial.ttf";
pub const LABEL_FONT_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v0.0.0/Arial.ttf";

pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;
pub const DEFAULT_MIN_SIZE: u32 = 40;

/// Frames between full re-detections on the streaming and file-video paths.
pub const DETECTION_INTERVAL: usize = 6;

/// Age brackets, in model output order, used when no label file is given.
pub const DEFAULT_AGE_LABELS: &[&str] = &[
    "0-2", "3-9", "10-19", "20-29", "30-39", "40-59", "60+",
];

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
