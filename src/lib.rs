#![deny(clippy::all)]

pub mod object;
pub mod utils;

pub use object::{
    build_document, convert, convert_dicom, convert_file, open_dicom, ConversionOutcome,
    ConvertOptions, DicomDocument, ErrorDocument, MetadataDocument, SliceDocument,
};
pub use utils::FieldValue;
