use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntaxIndex;
use dicom_object::{DefaultDicomObject, InMemDicomObject};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::prelude::*;
use tracing::debug;

#[derive(Debug, Snafu)]
pub enum Error {
    /// Missing required attribute {tag}
    MissingAttribute {
        tag: Tag,
        source: dicom_object::AccessError,
    },
    /// Could not convert attribute {tag}
    ConvertField {
        tag: Tag,
        source: dicom_core::value::ConvertValueError,
    },
    /// Unsupported bits allocated: {bits}
    UnsupportedBitsAllocated { bits: u16 },
    /// Unsupported samples per pixel: {samples}
    UnsupportedSamplesPerPixel { samples: u16 },
    /// Frame {frame} out of range (image has {frames} frame(s))
    FrameOutOfRange { frame: u32, frames: u32 },
    /// Frame {frame} lies beyond the addressable pixel data
    FrameOffsetOverflow { frame: u32 },
    /// Pixel data too short: need {needed} bytes, found {found}
    PixelDataLength { needed: usize, found: usize },
    /// Compressed pixel data ({transfer_syntax}) needs the transcode feature
    EncapsulatedUnsupported { transfer_syntax: String },
    /// Could not decode pixel data: {message}
    DecodePixelData { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Image geometry and sample encoding, as declared by the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub rows: u32,
    pub columns: u32,
    pub frames: u32,
    pub samples_per_pixel: u16,
    pub planar_configuration: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub pixel_representation: u16,
}

impl PixelLayout {
    /// Read the layout attributes.
    /// Rows and Columns are required, everything else falls back to the
    /// usual defaults for single-frame grayscale images.
    pub fn from_object(obj: &InMemDicomObject) -> Result<Self> {
        let rows = required_u32(obj, tags::ROWS)?;
        let columns = required_u32(obj, tags::COLUMNS)?;
        let bits_allocated = optional_u16(obj, tags::BITS_ALLOCATED).unwrap_or(16);
        let bits_stored = optional_u16(obj, tags::BITS_STORED)
            .filter(|b| (1..=bits_allocated).contains(b))
            .unwrap_or(bits_allocated);

        Ok(PixelLayout {
            rows,
            columns,
            frames: obj
                .element(tags::NUMBER_OF_FRAMES)
                .ok()
                .and_then(|e| e.to_int::<u32>().ok())
                .unwrap_or(1)
                .max(1),
            samples_per_pixel: optional_u16(obj, tags::SAMPLES_PER_PIXEL).unwrap_or(1),
            planar_configuration: optional_u16(obj, tags::PLANAR_CONFIGURATION).unwrap_or(0),
            bits_allocated,
            bits_stored,
            pixel_representation: optional_u16(obj, tags::PIXEL_REPRESENTATION).unwrap_or(0),
        })
    }

    fn pixels_per_frame(&self) -> usize {
        (self.rows as usize).saturating_mul(self.columns as usize)
    }

    fn samples_per_frame(&self) -> Option<usize> {
        (self.rows as usize)
            .checked_mul(self.columns as usize)?
            .checked_mul(self.samples_per_pixel as usize)
    }
}

fn required_u32(obj: &InMemDicomObject, tag: Tag) -> Result<u32> {
    obj.element(tag)
        .context(MissingAttributeSnafu { tag })?
        .to_int::<u32>()
        .context(ConvertFieldSnafu { tag })
}

fn optional_u16(obj: &InMemDicomObject, tag: Tag) -> Option<u16> {
    obj.element(tag).ok().and_then(|e| e.to_int::<u16>().ok())
}

/// Result of the 8-bit normalization over a flat sample buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub pixels: Vec<u8>,
    /// Smallest sample after the intercept was added
    pub minimum: f64,
    /// Largest sample after the intercept was added
    pub maximum: f64,
}

/// Map raw samples to 0..=255.
///
/// The order of operations is fixed: the intercept is added first, then the
/// min/max scan runs on the rescaled values, then negative values are clamped
/// to zero and divided by the maximum. When the maximum is not positive the
/// values are passed through unscaled, which the saturating cast turns into
/// black.
pub fn normalize_samples(samples: &[f64], rescale_intercept: f64) -> Normalized {
    let rescaled: Vec<f64> = samples.iter().map(|&s| s + rescale_intercept).collect();

    let (minimum, maximum) = if rescaled.is_empty() {
        (0.0, 0.0)
    } else {
        (
            rescaled.iter().cloned().fold(f64::INFINITY, f64::min),
            rescaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        )
    };

    let pixels = rescaled
        .iter()
        .map(|&value| {
            let scaled = if maximum > 0.0 {
                value.max(0.0) / maximum * 255.0
            } else {
                value
            };
            // float to int casts truncate and saturate, NaN becomes 0
            scaled as u8
        })
        .collect();

    Normalized {
        pixels,
        minimum,
        maximum,
    }
}

/// One normalized frame, shaped as `rows × columns`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub image: Vec<Vec<u8>>,
    pub minimum: f64,
    pub maximum: f64,
}

/// Read, rescale and normalize one frame of the object's pixel data.
///
/// Returns `Ok(None)` when the dataset carries no Pixel Data element.
pub fn render_normalized_frame(
    obj: &DefaultDicomObject,
    frame_number: u32,
) -> Result<Option<NormalizedImage>> {
    let Some(samples) = read_frame_samples(obj, frame_number)? else {
        return Ok(None);
    };

    let rescale_intercept = obj
        .element(tags::RESCALE_INTERCEPT)
        .ok()
        .and_then(|e| e.to_float64().ok())
        .unwrap_or(0.0);
    debug!("Rescale intercept: {}", rescale_intercept);

    let normalized = normalize_samples(&samples.values, rescale_intercept);
    Ok(Some(NormalizedImage {
        image: into_rows(normalized.pixels, samples.rows, samples.columns),
        minimum: normalized.minimum,
        maximum: normalized.maximum,
    }))
}

fn into_rows(pixels: Vec<u8>, rows: u32, columns: u32) -> Vec<Vec<u8>> {
    if columns == 0 {
        return vec![Vec::new(); rows as usize];
    }
    pixels
        .chunks(columns as usize)
        .map(|row| row.to_vec())
        .collect()
}

/// Grayscale samples of one frame, one `f64` per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSamples {
    pub rows: u32,
    pub columns: u32,
    pub values: Vec<f64>,
}

/// Extract the samples of one frame as floating point values.
///
/// Native pixel data is decoded from its bytes; encapsulated pixel data goes
/// through `dicom-pixeldata` with the modality LUT disabled, so that both
/// paths hand back stored values and the rescale is applied in one place.
pub fn read_frame_samples(
    obj: &DefaultDicomObject,
    frame_number: u32,
) -> Result<Option<FrameSamples>> {
    let Ok(Some(pixel_data)) = obj.element_opt(tags::PIXEL_DATA) else {
        return Ok(None);
    };

    let layout = PixelLayout::from_object(obj)?;
    debug!("Pixel layout: {:?}", layout);

    ensure!(
        frame_number < layout.frames,
        FrameOutOfRangeSnafu {
            frame: frame_number,
            frames: layout.frames,
        }
    );

    let interleaved = match pixel_data.value() {
        Value::Primitive(value) => decode_native_frame(value, &layout, frame_number)?,
        _ => decode_encapsulated_frame(obj, frame_number)?,
    };

    let values = to_grayscale(interleaved, &layout)?;
    Ok(Some(FrameSamples {
        rows: layout.rows,
        columns: layout.columns,
        values,
    }))
}

fn decode_native_frame(
    value: &PrimitiveValue,
    layout: &PixelLayout,
    frame_number: u32,
) -> Result<Vec<f64>> {
    let bytes_per_sample = match layout.bits_allocated {
        8 => 1,
        16 => 2,
        32 => 4,
        bits => return UnsupportedBitsAllocatedSnafu { bits }.fail(),
    };

    let (start, end) = layout
        .samples_per_frame()
        .and_then(|samples| samples.checked_mul(bytes_per_sample))
        .and_then(|frame_size| {
            let start = (frame_number as usize).checked_mul(frame_size)?;
            Some((start, start.checked_add(frame_size)?))
        })
        .context(FrameOffsetOverflowSnafu {
            frame: frame_number,
        })?;

    let bytes = value.to_bytes();
    ensure!(
        end <= bytes.len(),
        PixelDataLengthSnafu {
            needed: end,
            found: bytes.len(),
        }
    );

    let signed = layout.pixel_representation == 1;
    let samples = bytes[start..end]
        .chunks_exact(bytes_per_sample)
        .map(|chunk| {
            // native pixel data is little endian
            let raw = match chunk {
                [b] => *b as u32,
                [b0, b1] => u16::from_le_bytes([*b0, *b1]) as u32,
                [b0, b1, b2, b3] => u32::from_le_bytes([*b0, *b1, *b2, *b3]),
                _ => unreachable!("chunks_exact yields {} bytes", bytes_per_sample),
            };
            if signed {
                sign_extend(raw, layout.bits_stored) as f64
            } else {
                raw as f64
            }
        })
        .collect();

    Ok(samples)
}

fn sign_extend(raw: u32, bits_stored: u16) -> i64 {
    let shift = 64 - u32::from(bits_stored.clamp(1, 32));
    ((raw as i64) << shift) >> shift
}

#[cfg(feature = "transcode")]
fn decode_encapsulated_frame(obj: &DefaultDicomObject, frame_number: u32) -> Result<Vec<f64>> {
    use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};

    debug!(
        "Decoding compressed pixel data ({})",
        transfer_syntax_name(obj)
    );
    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| DecodePixelDataSnafu { message: e.to_string() }.build())?;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    decoded
        .to_vec_frame_with_options::<f64>(frame_number, &options)
        .map_err(|e| DecodePixelDataSnafu { message: e.to_string() }.build())
}

#[cfg(not(feature = "transcode"))]
fn decode_encapsulated_frame(obj: &DefaultDicomObject, _frame_number: u32) -> Result<Vec<f64>> {
    EncapsulatedUnsupportedSnafu {
        transfer_syntax: transfer_syntax_name(obj),
    }
    .fail()
}

fn transfer_syntax_name(obj: &DefaultDicomObject) -> String {
    let uid = obj.meta().transfer_syntax();
    TransferSyntaxRegistry
        .get(uid)
        .map(|ts| ts.name().to_string())
        .unwrap_or_else(|| uid.to_string())
}

/// Collapse color samples to one luminance value per pixel
fn to_grayscale(samples: Vec<f64>, layout: &PixelLayout) -> Result<Vec<f64>> {
    match layout.samples_per_pixel {
        1 => Ok(samples),
        3 => {
            let luminance = |r: f64, g: f64, b: f64| 0.299 * r + 0.587 * g + 0.114 * b;
            let n = layout.pixels_per_frame().min(samples.len() / 3);
            if layout.planar_configuration == 1 {
                let plane = samples.len() / 3;
                Ok((0..n)
                    .map(|i| luminance(samples[i], samples[plane + i], samples[2 * plane + i]))
                    .collect())
            } else {
                Ok(samples
                    .chunks_exact(3)
                    .take(n)
                    .map(|px| luminance(px[0], px[1], px[2]))
                    .collect())
            }
        }
        other => UnsupportedSamplesPerPixelSnafu { samples: other }.fail(),
    }
}
