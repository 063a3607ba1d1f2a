use dicom_core::value::{PrimitiveValue, Value};
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize, Serializer};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::utils::dicom_tags::parse_tag;

/**
 * Value of one named attribute, as exported to the viewer.
 *
 * `Missing` covers every way a field can fail to show up: the keyword is not
 * in the dictionary, the element is absent or empty, or its value could not be
 * converted. It serializes as the empty string, which is what the viewer
 * checks for.
 *
 * Multi-valued textual elements (e.g. `ImageType`) become `Strings`, binary
 * numeric elements with more than one value become `Numbers`, and everything
 * else is rendered to `Text`.
 */
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "FieldRepr")]
pub enum FieldValue {
    Missing,
    Text(String),
    Strings(Vec<String>),
    Numbers(Vec<f64>),
}

impl FieldValue {
    /// True for the sentinel and for values with no content.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Missing => true,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Strings(v) => v.is_empty(),
            FieldValue::Numbers(v) => v.is_empty(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Missing => serializer.serialize_str(""),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Strings(v) => v.serialize(serializer),
            FieldValue::Numbers(v) => v.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRepr {
    Text(String),
    Strings(Vec<String>),
    Numbers(Vec<f64>),
}

impl From<FieldRepr> for FieldValue {
    fn from(repr: FieldRepr) -> Self {
        match repr {
            FieldRepr::Text(s) if s.is_empty() => FieldValue::Missing,
            FieldRepr::Text(s) => FieldValue::Text(s),
            FieldRepr::Strings(v) => FieldValue::Strings(v),
            FieldRepr::Numbers(v) => FieldValue::Numbers(v),
        }
    }
}

/// Why a present element could not be turned into a [`FieldValue`]
#[derive(Debug, Snafu)]
enum FieldError {
    /// value is a sequence
    Sequence,
    /// value is an encapsulated pixel sequence
    PixelSequence,
    /// {source}
    Convert {
        source: dicom_core::value::ConvertValueError,
    },
}

/// Extract one attribute by keyword, never failing.
///
/// Conversion errors are reported on stderr and swallowed; absence is only
/// traced at debug level since most files lack some of the exported fields.
pub fn extract_field(obj: &InMemDicomObject, name: &str) -> FieldValue {
    let tag = match parse_tag(name) {
        Ok(tag) => tag,
        Err(reason) => {
            debug!("{} not extracted: {}", name, reason);
            return FieldValue::Missing;
        }
    };

    let elem = match obj.element_opt(tag) {
        Ok(Some(elem)) => elem,
        Ok(None) => {
            debug!("{} not present", name);
            return FieldValue::Missing;
        }
        Err(e) => {
            warn!("❌ Error extracting {}: {}", name, e);
            return FieldValue::Missing;
        }
    };

    match field_from_value(elem.value()) {
        Ok(value) => value,
        Err(e) => {
            warn!("❌ Error extracting {}: {}", name, e);
            FieldValue::Missing
        }
    }
}

fn field_from_value<I, P>(value: &Value<I, P>) -> Result<FieldValue, FieldError> {
    let primitive = match value {
        Value::Primitive(p) => p,
        Value::Sequence(_) => return SequenceSnafu.fail(),
        Value::PixelSequence(_) => return PixelSequenceSnafu.fail(),
    };

    if primitive.multiplicity() == 0 {
        return Ok(FieldValue::Missing);
    }

    if primitive.multiplicity() > 1 {
        if is_binary_numeric(primitive) {
            let numbers = primitive.to_multi_float64().context(ConvertSnafu)?;
            return Ok(FieldValue::Numbers(numbers));
        }
        let strings = primitive
            .to_multi_str()
            .iter()
            .map(|s| trim_padding(s).to_string())
            .collect();
        return Ok(FieldValue::Strings(strings));
    }

    let text = primitive.to_str();
    let text = trim_padding(&text);
    if text.is_empty() {
        Ok(FieldValue::Missing)
    } else {
        Ok(FieldValue::Text(text.to_string()))
    }
}

fn is_binary_numeric(value: &PrimitiveValue) -> bool {
    matches!(
        value,
        PrimitiveValue::I16(_)
            | PrimitiveValue::U16(_)
            | PrimitiveValue::I32(_)
            | PrimitiveValue::U32(_)
            | PrimitiveValue::I64(_)
            | PrimitiveValue::U64(_)
            | PrimitiveValue::F32(_)
            | PrimitiveValue::F64(_)
    )
}

// string values are padded to even length with spaces (or NUL for UI)
fn trim_padding(s: &str) -> &str {
    s.trim_end_matches(|c: char| c == '\0' || c == ' ')
}
