//! End-to-end tests for the `dicom2json` binary.
//!
//! Each test writes a small DICOM file into a temporary directory, runs the
//! compiled binary on it and inspects stdout, stderr and the exit status.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use dicom2json::{DicomDocument, FieldValue};
use dicom_core::value::{DataSetSequence, PrimitiveValue};
use dicom_core::{DataElement, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use serde_json::Value;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dicom2json"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run dicom2json")
}

fn write_dicom(dir: &Path, name: &str, elements: Vec<DataElement<InMemDicomObject>>) -> PathBuf {
    let path = dir.join(name);
    InMemDicomObject::from_element_iter(elements)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid("2.25.987654321"),
        )
        .unwrap()
        .write_to_file(&path)
        .unwrap();
    path
}

fn image_elements(pixels: Vec<u8>) -> Vec<DataElement<InMemDicomObject>> {
    vec![
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MR")),
        DataElement::new(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from("3")),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(2_u16)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(2_u16)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from("0")),
        DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(pixels.into())),
    ]
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn converts_two_by_two_image() {
    let dir = tempfile::tempdir().unwrap();
    let mut elements = image_elements(vec![0, 10, 20, 30]);
    elements.push(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Roe^Sam")));
    let path = write_dicom(dir.path(), "mr.dcm", elements);

    let out = run(&[path.to_str().unwrap()]);
    assert!(out.status.success());

    let doc: DicomDocument = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(doc.slices[0].image, Some(vec![vec![0, 85], vec![170, 255]]));
    assert_eq!(doc.slices[0].instance_number, FieldValue::Text("3".into()));
    assert_eq!(doc.slices[0].slice_location, FieldValue::Missing);
    assert_eq!(doc.slices[0].filepath, path.to_str().unwrap());
    assert_eq!(doc.metadata.minimum, 0.0);
    assert_eq!(doc.metadata.maximum, 30.0);
    assert_eq!(doc.metadata.width, Some(2));
    assert_eq!(doc.metadata.height, Some(2));
    assert_eq!(doc.metadata.patient_name, FieldValue::Text("Roe^Sam".into()));

    // indented with two spaces by default
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("{\n  \"slices\""));
}

#[test]
fn missing_patient_name_warns_but_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dicom(dir.path(), "anon.dcm", image_elements(vec![5, 5, 5, 5]));

    let out = run(&[path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));

    let json: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["metadata"]["PatientName"], "");
    assert_eq!(json["metadata"]["Modality"], "MR");

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("❌ Missing PatientName information!"), "{stderr}");
    assert!(!stderr.contains("Missing Modality"), "{stderr}");
}

#[test]
fn unreadable_file_yields_error_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.dcm");
    std::fs::write(&path, b"definitely not a dicom file").unwrap();

    let out = run(&["--compact", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));

    let json: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["error"], "Failed to process DICOM file");
    assert!(json["details"].as_str().unwrap().contains("garbage.dcm"));
    assert_eq!(json.as_object().unwrap().len(), 2);

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout.trim_end().lines().count(), 1);

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("❌ DICOM Processing Error"), "{stderr}");
}

#[test]
fn unconvertible_field_is_reported_and_left_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut elements = image_elements(vec![1, 2, 3, 4]);
    elements[0] = DataElement::new(
        tags::MODALITY,
        VR::SQ,
        DataSetSequence::from(Vec::<InMemDicomObject>::new()),
    );
    elements.push(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Roe^Sam")));
    let path = write_dicom(dir.path(), "odd.dcm", elements);

    let out = run(&[path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));

    let json: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["metadata"]["Modality"], "");
    assert_eq!(json["metadata"]["PatientName"], "Roe^Sam");
    assert!(json["slices"][0]["image"].is_array());

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("❌ Error extracting Modality"), "{stderr}");
    assert!(stderr.contains("❌ Missing Modality information!"), "{stderr}");
}

#[test]
fn no_pixel_data_reports_null_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dicom(
        dir.path(),
        "sr.dcm",
        vec![
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("SR")),
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Poe^Ed")),
        ],
    );

    let out = run(&[path.to_str().unwrap()]);
    assert!(out.status.success());

    let json: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(json["slices"][0]["image"].is_null());
    assert!(json["metadata"]["width"].is_null());
    assert_eq!(json["metadata"]["minimum"], 0.0);
    assert_eq!(json["metadata"]["maximum"], 0.0);

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("❌ No Pixel Data Found"), "{stderr}");
}

#[test]
fn selects_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut elements = image_elements(vec![0, 0, 0, 0, 40, 30, 20, 10]);
    elements.push(DataElement::new(tags::NUMBER_OF_FRAMES, VR::IS, PrimitiveValue::from("2")));
    let path = write_dicom(dir.path(), "cine.dcm", elements);

    let out = run(&["--frame", "1", path.to_str().unwrap()]);
    let doc: DicomDocument = serde_json::from_slice(&out.stdout).unwrap();
    // 30/40*255 = 191.25, 20/40*255 = 127.5, 10/40*255 = 63.75
    assert_eq!(doc.slices[0].image, Some(vec![vec![255, 191], vec![127, 63]]));

    let out = run(&["--frame", "2", path.to_str().unwrap()]);
    let json: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(json["details"].as_str().unwrap().contains("Frame 2 out of range"));
}

#[test]
fn missing_argument_exits_with_one() {
    let out = run(&[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("❌ No DICOM file provided!"), "{stderr}");
}

#[test]
fn missing_argument_is_reported_even_with_logging_off() {
    let out = Command::new(env!("CARGO_BIN_EXE_dicom2json"))
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run dicom2json");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("❌ No DICOM file provided!"), "{stderr}");
}
