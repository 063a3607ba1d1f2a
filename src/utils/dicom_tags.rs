use dicom_core::header::Tag;
use dicom_core::DataDictionary;
use dicom_dictionary_std::StandardDataDictionary;
use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
    /// Unknown attribute: {name}
    UnknownAttribute { name: String },
}

/// Resolve an attribute name to its tag.
///
/// Accepts dictionary keywords (`PatientName`), `(GGGG,EEEE)` and the compact
/// `GGGGEEEE` form.
pub fn parse_tag(name: &str) -> Result<Tag, Error> {
    StandardDataDictionary
        .parse_tag(name)
        .or_else(|| compact_hex_tag(name))
        .context(UnknownAttributeSnafu { name })
}

fn compact_hex_tag(s: &str) -> Option<Tag> {
    if s.len() != 8 || !s.is_ascii() {
        return None;
    }
    let group = u16::from_str_radix(&s[..4], 16).ok()?;
    let element = u16::from_str_radix(&s[4..], 16).ok()?;
    Some(Tag(group, element))
}
