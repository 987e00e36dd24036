use crate::shared::region::FaceRegion;

/// Opaque label text returned by the age classifier.
pub type Label = String;

/// Regions found in one frame, paired index-for-index with their labels.
///
/// A label slot is `None` when classification has not produced a label for
/// that region; the region is still drawn, just without text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    regions: Vec<FaceRegion>,
    labels: Vec<Option<Label>>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pairs regions with labels. Fails if the two sides differ in length.
    pub fn labeled(
        regions: Vec<FaceRegion>,
        labels: Vec<Option<Label>>,
    ) -> Result<Self, &'static str> {
        if regions.len() != labels.len() {
            return Err("regions and labels must have the same length");
        }
        Ok(Self { regions, labels })
    }

    pub fn regions(&self) -> &[FaceRegion] {
        &self.regions
    }

    pub fn labels(&self) -> &[Option<Label>] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FaceRegion, Option<&str>)> {
        self.regions
            .iter()
            .zip(self.labels.iter().map(|l| l.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_rejects_length_mismatch() {
        let result = DetectionResult::labeled(vec![FaceRegion::new(0, 0, 5, 5)], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_iter_pairs_in_order() {
        let result = DetectionResult::labeled(
            vec![FaceRegion::new(0, 0, 5, 5), FaceRegion::new(10, 0, 5, 5)],
            vec![Some("20-29".to_string()), None],
        )
        .unwrap();
        let pairs: Vec<_> = result.iter().collect();
        assert_eq!(pairs[0].1, Some("20-29"));
        assert_eq!(pairs[1].0.x, 10);
        assert_eq!(pairs[1].1, None);
    }

    #[test]
    fn test_empty_default() {
        assert!(DetectionResult::empty().is_empty());
    }
}
