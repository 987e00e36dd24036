pub mod box_label_annotator;
pub mod label_font;
