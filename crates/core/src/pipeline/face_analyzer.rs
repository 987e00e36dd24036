use std::sync::Arc;

use crate::classification::domain::age_classifier::AgeClassifier;
use crate::detection::domain::face_localizer::FaceLocalizer;
use crate::shared::detection_result::DetectionResult;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;

/// One detection cycle: localize faces, crop each region and label it.
///
/// A classifier failure costs only that region its label. A region that
/// cannot be cropped fails the whole frame, as does a localizer error.
#[derive(Clone)]
pub struct FaceAnalyzer {
    localizer: Arc<dyn FaceLocalizer>,
    classifier: Arc<dyn AgeClassifier>,
}

impl FaceAnalyzer {
    pub fn new(localizer: Arc<dyn FaceLocalizer>, classifier: Arc<dyn AgeClassifier>) -> Self {
        Self {
            localizer,
            classifier,
        }
    }

    pub fn analyze(&self, frame: &Frame) -> Result<DetectionResult, PipelineError> {
        let index = frame.index();
        let regions = self
            .localizer
            .locate(frame)
            .map_err(|e| PipelineError::frame(index, format!("localization failed: {e}")))?;

        let mut labels = Vec::with_capacity(regions.len());
        for region in &regions {
            let crop = frame.crop(region).ok_or_else(|| {
                PipelineError::frame(index, format!("invalid crop {region:?}"))
            })?;
            match self.classifier.classify(&crop) {
                Ok(label) => labels.push(Some(label)),
                Err(e) => {
                    log::warn!("frame {index}: classification failed for {region:?}: {e}");
                    labels.push(None);
                }
            }
        }

        DetectionResult::labeled(regions, labels).map_err(|e| PipelineError::frame(index, e))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::detection_result::Label;
    use crate::shared::region::FaceRegion;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same regions for every frame and counts calls.
    pub(crate) struct FixedLocalizer {
        pub(crate) regions: Vec<FaceRegion>,
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl FixedLocalizer {
        pub(crate) fn new(regions: Vec<FaceRegion>) -> Self {
            Self {
                regions,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FaceLocalizer for FixedLocalizer {
        fn locate(&self, _frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.regions.clone())
        }
    }

    pub(crate) struct FailingLocalizer;

    impl FaceLocalizer for FailingLocalizer {
        fn locate(&self, _frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
            Err("localizer exploded".into())
        }
    }

    /// Labels a crop by its width, failing for crops narrower than `fail_below`.
    pub(crate) struct WidthClassifier {
        pub(crate) fail_below: u32,
    }

    impl AgeClassifier for WidthClassifier {
        fn classify(&self, face: &Frame) -> Result<Label, Box<dyn std::error::Error>> {
            if face.width() < self.fail_below {
                return Err("too small to classify".into());
            }
            Ok(format!("w{}", face.width()))
        }
    }

    pub(crate) fn analyzer(regions: Vec<FaceRegion>) -> FaceAnalyzer {
        FaceAnalyzer::new(
            Arc::new(FixedLocalizer::new(regions)),
            Arc::new(WidthClassifier { fail_below: 0 }),
        )
    }

    fn frame() -> Frame {
        Frame::new(vec![100u8; 200 * 200 * 3], 200, 200, 3, 7)
    }

    #[test]
    fn test_labels_follow_region_order() {
        let result = analyzer(vec![
            FaceRegion::new(0, 0, 50, 50),
            FaceRegion::new(100, 100, 60, 40),
        ])
        .analyze(&frame())
        .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.labels()[0].as_deref(), Some("w50"));
        assert_eq!(result.labels()[1].as_deref(), Some("w60"));
    }

    #[test]
    fn test_no_faces_is_empty_result() {
        let result = analyzer(vec![]).analyze(&frame()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_classifier_failure_leaves_region_unlabeled() {
        let analyzer = FaceAnalyzer::new(
            Arc::new(FixedLocalizer::new(vec![
                FaceRegion::new(0, 0, 30, 30),
                FaceRegion::new(50, 50, 80, 80),
            ])),
            Arc::new(WidthClassifier { fail_below: 50 }),
        );
        let result = analyzer.analyze(&frame()).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.labels()[0], None);
        assert_eq!(result.labels()[1].as_deref(), Some("w80"));
    }

    #[test]
    fn test_invalid_crop_fails_frame() {
        let err = analyzer(vec![FaceRegion::new(180, 180, 50, 50)])
            .analyze(&frame())
            .unwrap_err();
        assert!(matches!(err, PipelineError::FrameProcessing { index: 7, .. }));
    }

    #[test]
    fn test_zero_area_region_fails_frame() {
        let err = analyzer(vec![FaceRegion::new(10, 10, 0, 20)])
            .analyze(&frame())
            .unwrap_err();
        assert!(matches!(err, PipelineError::FrameProcessing { .. }));
    }

    #[test]
    fn test_localizer_failure_is_frame_error() {
        let analyzer = FaceAnalyzer::new(
            Arc::new(FailingLocalizer),
            Arc::new(WidthClassifier { fail_below: 0 }),
        );
        let err = analyzer.analyze(&frame()).unwrap_err();
        assert!(err.to_string().contains("localizer exploded"));
    }
}
