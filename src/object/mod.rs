use std::path::{Path, PathBuf};

use dicom_dictionary_std::tags;
use dicom_object::file::ReadPreamble;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use snafu::ErrorCompat;
use tracing::{debug, error, warn};

use crate::utils::image_processing;
use crate::utils::{extract_field, render_normalized_frame, FieldValue};

/// Message carried by every error document
pub const ERROR_MESSAGE: &str = "Failed to process DICOM file";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Could not open DICOM file {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: Box<dicom_object::ReadError>,
    },

    /// Could not process pixel data
    PixelData { source: image_processing::Error },
}

/// Conversion settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Frame to export from multi-frame images (0-based)
    pub frame_number: u32,
    /// Indent the JSON output with two spaces
    pub pretty: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            frame_number: 0,
            pretty: true,
        }
    }
}

/// One exported slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceDocument {
    /// Normalized 8-bit samples, `height` rows of `width` values
    pub image: Option<Vec<Vec<u8>>>,
    #[serde(rename = "InstanceNumber")]
    pub instance_number: FieldValue,
    #[serde(rename = "SliceLocation")]
    pub slice_location: FieldValue,
    pub filepath: String,
}

/// Document-level description of the image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Smallest rescaled sample, before clamping
    pub minimum: f64,
    /// Largest rescaled sample, before clamping
    pub maximum: f64,
    #[serde(rename = "Modality")]
    pub modality: FieldValue,
    #[serde(rename = "PatientName")]
    pub patient_name: FieldValue,
    #[serde(rename = "PatientBirthDate")]
    pub patient_birth_date: FieldValue,
    #[serde(rename = "StudyName")]
    pub study_name: FieldValue,
    #[serde(rename = "SeriesDescription")]
    pub series_description: FieldValue,
    #[serde(rename = "SeriesName")]
    pub series_name: FieldValue,
    #[serde(rename = "StudyDate")]
    pub study_date: FieldValue,
}

/// Successful conversion output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DicomDocument {
    pub slices: Vec<SliceDocument>,
    pub metadata: MetadataDocument,
}

/// Output emitted instead of a [`DicomDocument`] when the file cannot be converted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub error: String,
    pub details: String,
}

impl ErrorDocument {
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            error: ERROR_MESSAGE.to_string(),
            details: details.into(),
        }
    }
}

/// Either document, serialized without a wrapping tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversionOutcome {
    Success(DicomDocument),
    Failure(ErrorDocument),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success(_))
    }

    /// Render as JSON. `pretty` only applies to success documents, error
    /// documents are always a single line.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        match self {
            ConversionOutcome::Success(doc) if pretty => serde_json::to_string_pretty(doc),
            ConversionOutcome::Success(doc) => serde_json::to_string(doc),
            ConversionOutcome::Failure(doc) => serde_json::to_string(doc),
        }
    }
}

/// Open a DICOM file, with or without the 128-byte preamble.
pub fn open_dicom(path: &Path) -> Result<DefaultDicomObject, Error> {
    OpenFileOptions::new()
        .read_preamble(ReadPreamble::Auto)
        .open_file(path)
        .map_err(Box::from)
        .context(ReadFileSnafu { path })
}

/// Assemble the output document for an already parsed object.
///
/// `filepath` is echoed verbatim into the slice entry.
pub fn build_document(
    obj: &DefaultDicomObject,
    filepath: &str,
    options: &ConvertOptions,
) -> Result<DicomDocument, Error> {
    let normalized = render_normalized_frame(obj, options.frame_number).context(PixelDataSnafu)?;

    let (image, minimum, maximum) = match normalized {
        Some(frame) => (Some(frame.image), frame.minimum, frame.maximum),
        None => {
            warn!("❌ No Pixel Data Found");
            (None, 0.0, 0.0)
        }
    };

    let slice = SliceDocument {
        image,
        instance_number: extract_field(obj, "InstanceNumber"),
        slice_location: extract_field(obj, "SliceLocation"),
        filepath: filepath.to_string(),
    };

    let metadata = MetadataDocument {
        width: obj
            .element(tags::COLUMNS)
            .ok()
            .and_then(|e| e.to_int::<u32>().ok()),
        height: obj
            .element(tags::ROWS)
            .ok()
            .and_then(|e| e.to_int::<u32>().ok()),
        minimum,
        maximum,
        modality: extract_field(obj, "Modality"),
        patient_name: extract_field(obj, "PatientName"),
        patient_birth_date: extract_field(obj, "PatientBirthDate"),
        study_name: extract_field(obj, "StudyName"),
        series_description: extract_field(obj, "SeriesDescription"),
        series_name: extract_field(obj, "SeriesName"),
        study_date: extract_field(obj, "StudyDate"),
    };

    if metadata.modality.is_empty() {
        warn!("❌ Missing Modality information!");
    }
    if metadata.patient_name.is_empty() {
        warn!("❌ Missing PatientName information!");
    }

    Ok(DicomDocument {
        slices: vec![slice],
        metadata,
    })
}

/// Read and convert one file, propagating file-level faults.
pub fn convert_file(path: &Path, options: &ConvertOptions) -> Result<DicomDocument, Error> {
    let obj = open_dicom(path)?;
    debug!("Opened {}", path.display());
    build_document(&obj, &path.display().to_string(), options)
}

/// Convert one file, turning any file-level fault into an error document.
pub fn convert(path: &Path, options: &ConvertOptions) -> ConversionOutcome {
    match convert_file(path, options) {
        Ok(document) => ConversionOutcome::Success(document),
        Err(e) => {
            let details = error_details(&e);
            error!("❌ DICOM Processing Error: {}", details);
            ConversionOutcome::Failure(ErrorDocument::new(details))
        }
    }
}

/// Convert one file and render the outcome as JSON. Never fails.
pub fn convert_dicom(path: &Path, options: &ConvertOptions) -> String {
    let outcome = convert(path, options);
    match outcome.to_json(options.pretty) {
        Ok(json) => json,
        Err(e) => {
            error!("❌ DICOM Processing Error: {}", e);
            serde_json::json!({ "error": ERROR_MESSAGE, "details": e.to_string() }).to_string()
        }
    }
}

/// Flatten an error and its causes into one line
fn error_details(e: &Error) -> String {
    e.iter_chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
