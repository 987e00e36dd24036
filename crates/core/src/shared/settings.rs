use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_AGE_LABELS, DEFAULT_JPEG_QUALITY, DEFAULT_MIN_NEIGHBORS, DEFAULT_MIN_SIZE,
    DEFAULT_SCALE_FACTOR, DETECTION_INTERVAL,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Cascade detector tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Pyramid downscale ratio between successive scales.
    pub scale_factor: f64,
    /// Overlapping raw hits required to confirm a region.
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
    pub max_size: Option<(u32, u32)>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: (DEFAULT_MIN_SIZE, DEFAULT_MIN_SIZE),
            max_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    pub detection_interval: usize,
    pub jpeg_quality: u8,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            detection_interval: DETECTION_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Lossless formats accepted for batch outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputImageFormat {
    #[default]
    Png,
    Bmp,
    Tiff,
}

impl OutputImageFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "tiff" | "tif" => Some(Self::Tiff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    Mpeg4,
    H264,
}

impl VideoCodec {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mpeg4" => Some(Self::Mpeg4),
            "h264" | "x264" => Some(Self::H264),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    /// Extension of the output container; selects the muxer.
    pub container: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::Mpeg4,
            container: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStyle {
    pub color: [u8; 3],
    pub line_width: u32,
    pub text_height: u32,
    /// Vertical gap between the label baseline and the box's top edge.
    pub label_gap: u32,
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0],
            line_width: 4,
            text_height: 21,
            label_gap: 10,
            font_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub labels: Vec<String>,
    /// Square model input side; read from the model when it declares one.
    pub input_size: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            labels: DEFAULT_AGE_LABELS.iter().map(|s| s.to_string()).collect(),
            input_size: 224,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detection: DetectionSettings,
    pub streaming: StreamingSettings,
    pub output_image_format: OutputImageFormat,
    pub video: VideoSettings,
    pub annotation: AnnotationStyle,
    pub classifier: ClassifierSettings,
}

impl Settings {
    /// Reads a JSON settings file; missing fields take their defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let d = &self.detection;
        if d.scale_factor.is_nan() || d.scale_factor <= 1.0 {
            return Err(SettingsError::Invalid(format!(
                "scale_factor must be greater than 1.0, got {}",
                d.scale_factor
            )));
        }
        if d.min_size.0 == 0 || d.min_size.1 == 0 {
            return Err(SettingsError::Invalid("min_size must be at least 1x1".into()));
        }
        if let Some((w, h)) = d.max_size {
            if w < d.min_size.0 || h < d.min_size.1 {
                return Err(SettingsError::Invalid(
                    "max_size must not be smaller than min_size".into(),
                ));
            }
        }
        if self.streaming.detection_interval == 0 {
            return Err(SettingsError::Invalid(
                "detection_interval must be >= 1".into(),
            ));
        }
        if !(1..=100).contains(&self.streaming.jpeg_quality) {
            return Err(SettingsError::Invalid(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.streaming.jpeg_quality
            )));
        }
        if self.classifier.labels.is_empty() {
            return Err(SettingsError::Invalid("classifier labels must not be empty".into()));
        }
        if self.annotation.line_width == 0 {
            return Err(SettingsError::Invalid("line_width must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_detector_conventions() {
        let s = Settings::default();
        assert_eq!(s.detection.scale_factor, 1.1);
        assert_eq!(s.detection.min_neighbors, 5);
        assert_eq!(s.detection.min_size, (40, 40));
        assert_eq!(s.streaming.detection_interval, 6);
        assert_eq!(s.output_image_format, OutputImageFormat::Png);
        assert_eq!(s.video.codec, VideoCodec::Mpeg4);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "detection": { "min_neighbors": 3 }, "output_image_format": "bmp" }"#,
        )
        .unwrap();

        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.detection.min_neighbors, 3);
        assert_eq!(s.detection.scale_factor, 1.1);
        assert_eq!(s.output_image_format, OutputImageFormat::Bmp);
        assert_eq!(s.streaming.detection_interval, 6);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = Settings::load_from(Path::new("/nonexistent/settings.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{ "streaming": { "detection_interval": 0 } }"#).unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_scale_factor_must_exceed_one() {
        let mut s = Settings::default();
        s.detection.scale_factor = 1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn test_format_and_codec_names() {
        assert_eq!(OutputImageFormat::from_name("TIF"), Some(OutputImageFormat::Tiff));
        assert_eq!(OutputImageFormat::from_name("jpeg"), None);
        assert_eq!(VideoCodec::from_name("h264"), Some(VideoCodec::H264));
    }
}
