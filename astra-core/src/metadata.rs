//! Image metadata handed over by an external analysis backend
//!
//! The engine never reads image bytes. An analysis backend (exiftool, an ML
//! service) extracts the fields and hands over a bundle shaped like exiftool's
//! `-json` output. Field names follow exiftool so the backend's output can be
//! fed in unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::FINGERPRINT_LEN;

/// Tags exiftool may emit alongside the preferred one; the first present wins
const TAG_FALLBACKS: &[(&str, &[&str])] = &[
    ("LensModel", &["Lens", "LensID"]),
    ("SerialNumber", &["BodySerialNumber", "InternalSerialNumber"]),
    ("DateTimeOriginal", &["CreateDate", "ModifyDate"]),
];

/// Already-extracted EXIF fields for one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifBundle {
    #[serde(rename = "SourceFile", default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    #[serde(rename = "Make", default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    #[serde(rename = "Model", default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    #[serde(rename = "LensModel", default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,

    #[serde(rename = "SerialNumber", default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    #[serde(
        rename = "GPSLatitude",
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub gps_latitude: Option<f64>,

    #[serde(
        rename = "GPSLongitude",
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub gps_longitude: Option<f64>,

    #[serde(
        rename = "GPSAltitude",
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub gps_altitude: Option<f64>,

    #[serde(rename = "DateTimeOriginal", default, skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<String>,

    #[serde(rename = "Software", default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,

    #[serde(
        rename = "HistorySoftwareAgent",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub edit_history: Vec<String>,
}

impl ExifBundle {
    /// Parse a bundle from exiftool `-json` output (an object, or an array whose
    /// first element is the object)
    ///
    /// Fallback tags (`Lens`, `CreateDate`, ...) fill a field only when its
    /// preferred tag is missing. `GPSAltitudeRef` of 1 or "Below Sea Level"
    /// makes the altitude negative.
    pub fn from_exiftool_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        let value = match value {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };

        let Value::Object(mut object) = value else {
            return serde_json::from_value(value);
        };
        resolve_fallbacks(&mut object);
        let below_sea_level = object.get("GPSAltitudeRef").is_some_and(is_below_sea_level);

        let mut bundle: Self = serde_json::from_value(Value::Object(object))?;
        if below_sea_level {
            bundle.gps_altitude = bundle.gps_altitude.map(|altitude| -altitude.abs());
        }
        Ok(bundle)
    }

    pub fn has_camera(&self) -> bool {
        self.camera_make.is_some() || self.camera_model.is_some()
    }

    /// A fix needs both coordinates
    pub fn has_gps(&self) -> bool {
        self.gps_latitude.is_some() && self.gps_longitude.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_camera()
            && self.gps_latitude.is_none()
            && self.gps_longitude.is_none()
            && self.gps_altitude.is_none()
            && self.lens.is_none()
            && self.serial_number.is_none()
            && self.capture_time.is_none()
            && self.software.is_none()
            && self.edit_history.is_empty()
    }

    /// Identity of the bundle: the source file name when known, otherwise a
    /// digest of the bundle contents
    pub fn identifier(&self) -> String {
        if let Some(file) = &self.source_file {
            return file.clone();
        }
        let json = serde_json::to_string(self).unwrap_or_default();
        let digest = format!("{:x}", Sha256::digest(json.as_bytes()));
        format!("image-metadata:{}", &digest[..FINGERPRINT_LEN])
    }
}

fn resolve_fallbacks(object: &mut Map<String, Value>) {
    for (preferred, fallbacks) in TAG_FALLBACKS {
        for fallback in *fallbacks {
            let Some(value) = object.remove(*fallback) else {
                continue;
            };
            let missing = object.get(*preferred).map_or(true, Value::is_null);
            if missing && !value.is_null() {
                object.insert(preferred.to_string(), value);
            }
        }
    }
}

fn is_below_sea_level(reference: &Value) -> bool {
    match reference {
        Value::Number(n) => n.as_u64() == Some(1),
        Value::String(s) => s.trim() == "1" || s.to_lowercase().contains("below"),
        _ => false,
    }
}

/// Accept numbers, numeric strings, and exiftool's `"37.77 N"` style strings
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_coordinate(&s),
        _ => None,
    }))
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();

    // Degrees, then optional minutes and seconds
    let parts: Vec<f64> = trimmed
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;

    let (degrees, rest) = parts.split_first()?;
    let minutes = rest.first().copied().unwrap_or(0.0);
    let seconds = rest.get(1).copied().unwrap_or(0.0);
    let magnitude = degrees.abs() + minutes / 60.0 + seconds / 3600.0;

    // Hemisphere suffix, or the altitude's "Below Sea Level"
    let negative = *degrees < 0.0
        || trimmed.ends_with('S')
        || trimmed.ends_with('W')
        || trimmed.to_lowercase().contains("below");
    Some(if negative { -magnitude } else { magnitude })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(entry)) => vec![entry],
        Some(OneOrMany::Many(entries)) => entries,
        None => Vec::new(),
    })
}
