pub mod age_classifier;
