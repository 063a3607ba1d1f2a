pub mod dicom_tags;
pub mod image_processing;
pub mod tag_extractor;

// Re-export commonly used items
pub use dicom_tags::parse_tag;
pub use image_processing::{normalize_samples, render_normalized_frame, Normalized, NormalizedImage};
pub use tag_extractor::{extract_field, FieldValue};
