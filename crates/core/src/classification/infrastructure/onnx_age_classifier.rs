/// Age-bracket classifier backed by an ONNX Runtime session.
///
/// The crop is resized to the model's square input, normalized with
/// ImageNet statistics and laid out as NCHW. The highest-scoring output
/// index selects the label.
use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::classification::domain::age_classifier::AgeClassifier;
use crate::shared::detection_result::Label;
use crate::shared::frame::Frame;
use crate::shared::settings::ClassifierSettings;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct OnnxAgeClassifier {
    session: Mutex<ort::session::Session>,
    labels: Vec<Label>,
    input_size: u32,
}

impl OnnxAgeClassifier {
    pub fn new(
        model_path: &Path,
        settings: &ClassifierSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if settings.labels.is_empty() {
            return Err("classifier needs at least one label".into());
        }
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        // NCHW: [1, 3, H, W]; dynamic dimensions come back as -1.
        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(settings.input_size);
        log::info!(
            "Loaded age classifier {} (input {input_size}px, {} labels)",
            model_path.display(),
            settings.labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            labels: settings.labels.clone(),
            input_size,
        })
    }
}

impl AgeClassifier for OnnxAgeClassifier {
    fn classify(&self, face: &Frame) -> Result<Label, Box<dyn std::error::Error>> {
        let rgb = face.to_rgb_image().ok_or("classifier expects an RGB crop")?;
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err("empty face crop".into());
        }
        let tensor = preprocess(&rgb, self.input_size);
        let input_value = ort::value::Tensor::from_array(tensor)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let scores = outputs[0].try_extract_array::<f32>()?;
        let scores = scores.as_slice().ok_or("Cannot get score slice")?;

        if scores.len() != self.labels.len() {
            return Err(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )
            .into());
        }
        let best = argmax(scores).ok_or("model scores are all NaN")?;
        Ok(self.labels[best].clone())
    }
}

fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Resize to `size`x`size`, scale to [0, 1], apply ImageNet mean/std, NCHW.
fn preprocess(rgb: &RgbImage, size: u32) -> ndarray::Array4<f32> {
    let resized = Frame::from_rgb_image(imageops::resize(rgb, size, size, FilterType::Triangle), 0);
    let n = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, n, n));
    for ((y, x, c), &v) in resized.as_ndarray().indexed_iter() {
        tensor[[0, c, y, x]] = (v as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
    }
    tensor
}

/// Index of the largest finite score; the first one wins ties.
fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
        .map(|(i, _)| i)
}
