use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use dicom_core::value::PrimitiveValue;
use dicom_core::{Tag, VR};
use dicom_object::open_file;
use nifti::{NiftiHeader, NiftiObject, ReaderOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::elements::{DecodedSet, ElementSpec, TagValue};
use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Dicom,
    Nifti,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Dicom => write!(f, "dicom"),
            SourceFormat::Nifti => write!(f, "nifti"),
        }
    }
}

/// Read access to per-file tag values for one source format, selected once
/// per run.
///
/// `extract` opens the file read-only and decodes every entry of the
/// specification into a fresh decoded set. A tag that is missing or fails to
/// decode degrades to the absence marker and never aborts the remaining tags;
/// only a file that cannot be opened at all is an error.
pub trait TagSource {
    fn file_extension(&self) -> &'static str;

    /// Check every source key of the specification before a batch starts.
    /// Malformed keys are a configuration error, not a per-file one.
    fn validate_spec(&self, spec: &ElementSpec) -> Result<(), IndexError>;

    fn extract(&self, path: &Path, spec: &ElementSpec) -> Result<DecodedSet, IndexError>;
}

/// Tag lookup by "group,element" hexadecimal pair in a decoded DICOM file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomSource;

impl TagSource for DicomSource {
    fn file_extension(&self) -> &'static str {
        "dcm"
    }

    fn validate_spec(&self, spec: &ElementSpec) -> Result<(), IndexError> {
        for entry in spec.entries() {
            parse_tag(&entry.source_key)?;
        }
        Ok(())
    }

    fn extract(&self, path: &Path, spec: &ElementSpec) -> Result<DecodedSet, IndexError> {
        let object = open_file(path).map_err(|err| IndexError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let mut decoded = spec.decoded_set();
        for entry in spec.entries() {
            // Keys were validated up front; a bad one here only loses its column.
            let Ok(tag) = parse_tag(&entry.source_key) else {
                continue;
            };
            match object.element(tag) {
                Ok(element) => {
                    let value = element
                        .value()
                        .primitive()
                        .and_then(|primitive| decode_element(element.vr(), primitive));
                    match value {
                        Some(value) => decoded.set(&entry.name, value),
                        None => debug!(column = entry.name.as_str(), "tag present but empty"),
                    }
                }
                Err(_) => {
                    debug!(
                        column = entry.name.as_str(),
                        tag = entry.source_key.as_str(),
                        "cannot read DICOM tag"
                    );
                }
            }
        }
        Ok(decoded)
    }
}

/// Parse a `"GGGG,EEEE"` hexadecimal pair into a DICOM tag.
pub fn parse_tag(key: &str) -> Result<Tag, IndexError> {
    let (group, element) = key
        .split_once(',')
        .ok_or_else(|| IndexError::InvalidSourceKey(key.to_string()))?;
    let group = u16::from_str_radix(group.trim(), 16)
        .map_err(|_| IndexError::InvalidSourceKey(key.to_string()))?;
    let element = u16::from_str_radix(element.trim(), 16)
        .map_err(|_| IndexError::InvalidSourceKey(key.to_string()))?;
    Ok(Tag(group, element))
}

fn decode_element(vr: VR, primitive: &PrimitiveValue) -> Option<TagValue> {
    match vr {
        // Decimal strings coerce to integer via truncating float conversion;
        // multi-valued representations take the first value.
        VR::DS => primitive
            .to_multi_float64()
            .ok()
            .and_then(|values| values.first().copied())
            .map(|value| TagValue::Int(value as i64)),
        VR::IS => primitive
            .to_multi_int::<i64>()
            .ok()
            .and_then(|values| values.first().copied())
            .map(TagValue::Int),
        _ => decode_primitive(primitive),
    }
}

fn decode_primitive(primitive: &PrimitiveValue) -> Option<TagValue> {
    match primitive {
        PrimitiveValue::Empty => None,
        PrimitiveValue::Str(value) => Some(TagValue::Text(value.trim().to_string())),
        PrimitiveValue::Strs(values) => scalar_or_list(
            values
                .iter()
                .map(|value| TagValue::Text(value.trim().to_string())),
        ),
        PrimitiveValue::U8(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v as i64))),
        PrimitiveValue::I16(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v as i64))),
        PrimitiveValue::U16(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v as i64))),
        PrimitiveValue::I32(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v as i64))),
        PrimitiveValue::U32(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v as i64))),
        PrimitiveValue::I64(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v))),
        PrimitiveValue::U64(values) => scalar_or_list(values.iter().map(|v| TagValue::Int(*v as i64))),
        PrimitiveValue::F32(values) => {
            scalar_or_list(values.iter().map(|v| TagValue::Real(*v as f64)))
        }
        PrimitiveValue::F64(values) => scalar_or_list(values.iter().map(|v| TagValue::Real(*v))),
        // Dates, times and anything else keep their textual representation.
        other => {
            if other.multiplicity() > 1 {
                scalar_or_list(
                    other
                        .to_multi_str()
                        .iter()
                        .map(|value| TagValue::Text(value.trim().to_string())),
                )
            } else {
                let text = other.to_str().trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(TagValue::Text(text))
                }
            }
        }
    }
}

fn scalar_or_list(values: impl Iterator<Item = TagValue>) -> Option<TagValue> {
    let mut values: Vec<TagValue> = values.collect();
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(TagValue::List(values)),
    }
}

/// Header-field lookup in a decoded NIFTI-1 file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiSource;

impl TagSource for NiftiSource {
    fn file_extension(&self) -> &'static str {
        "nii"
    }

    fn validate_spec(&self, _spec: &ElementSpec) -> Result<(), IndexError> {
        // An unknown field name degrades to the absence marker per file.
        Ok(())
    }

    fn extract(&self, path: &Path, spec: &ElementSpec) -> Result<DecodedSet, IndexError> {
        let object = ReaderOptions::new()
            .read_file(path)
            .map_err(|err| IndexError::Decode {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let header = object.header();

        let mut decoded = spec.decoded_set();
        for entry in spec.entries() {
            match header_value(header, &entry.source_key) {
                Some(value) => decoded.set(&entry.name, value),
                None => {
                    debug!(
                        column = entry.name.as_str(),
                        field = entry.source_key.as_str(),
                        "cannot read NIFTI header field"
                    );
                }
            }
        }
        Ok(decoded)
    }
}

/// Look up one NIFTI-1 header field by name. Array fields become ordered
/// sequences of scalars, byte-string fields decode lossily to text.
pub fn header_value(header: &NiftiHeader, field: &str) -> Option<TagValue> {
    let value = match field {
        "dim_info" => TagValue::Int(header.dim_info as i64),
        "dim" => int_list(header.dim.iter().map(|v| *v as i64)),
        "intent_p1" => TagValue::Real(header.intent_p1 as f64),
        "intent_p2" => TagValue::Real(header.intent_p2 as f64),
        "intent_p3" => TagValue::Real(header.intent_p3 as f64),
        "intent_code" => TagValue::Int(header.intent_code as i64),
        "datatype" => TagValue::Int(header.datatype as i64),
        "bitpix" => TagValue::Int(header.bitpix as i64),
        "slice_start" => TagValue::Int(header.slice_start as i64),
        "pixdim" => real_list(header.pixdim.iter().map(|v| *v as f64)),
        "vox_offset" => TagValue::Real(header.vox_offset as f64),
        "scl_slope" => TagValue::Real(header.scl_slope as f64),
        "scl_inter" => TagValue::Real(header.scl_inter as f64),
        "slice_end" => TagValue::Int(header.slice_end as i64),
        "slice_code" => TagValue::Int(header.slice_code as i64),
        "xyzt_units" => TagValue::Int(header.xyzt_units as i64),
        "cal_max" => TagValue::Real(header.cal_max as f64),
        "cal_min" => TagValue::Real(header.cal_min as f64),
        "slice_duration" => TagValue::Real(header.slice_duration as f64),
        "toffset" => TagValue::Real(header.toffset as f64),
        "glmax" => TagValue::Int(header.glmax as i64),
        "glmin" => TagValue::Int(header.glmin as i64),
        "descrip" => text_field(&header.descrip),
        "aux_file" => text_field(&header.aux_file),
        "qform_code" => TagValue::Int(header.qform_code as i64),
        "sform_code" => TagValue::Int(header.sform_code as i64),
        "quatern_b" => TagValue::Real(header.quatern_b as f64),
        "quatern_c" => TagValue::Real(header.quatern_c as f64),
        "quatern_d" => TagValue::Real(header.quatern_d as f64),
        "qoffset_x" => TagValue::Real(header.quatern_x as f64),
        "qoffset_y" => TagValue::Real(header.quatern_y as f64),
        "qoffset_z" => TagValue::Real(header.quatern_z as f64),
        "srow_x" => real_list(header.srow_x.iter().map(|v| *v as f64)),
        "srow_y" => real_list(header.srow_y.iter().map(|v| *v as f64)),
        "srow_z" => real_list(header.srow_z.iter().map(|v| *v as f64)),
        "intent_name" => text_field(&header.intent_name),
        "magic" => text_field(&header.magic),
        _ => return None,
    };
    Some(value)
}

fn int_list(values: impl Iterator<Item = i64>) -> TagValue {
    TagValue::List(values.map(TagValue::Int).collect())
}

fn real_list(values: impl Iterator<Item = f64>) -> TagValue {
    TagValue::List(values.map(TagValue::Real).collect())
}

fn text_field(bytes: &[u8]) -> TagValue {
    TagValue::Text(
        String::from_utf8_lossy(bytes)
            .trim_end_matches('\0')
            .trim()
            .to_string(),
    )
}
