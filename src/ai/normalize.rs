// normalize.rs — Turns the agent's raw response body into display text.
//
// The agent has answered in several shapes over time; fields are checked in a
// fixed order and the first string wins:
//   1. `text`
//   2. `description`
//   3. `result.text` (older agent responses nest the text under `result`)

use serde::de::{self, Deserializer as _, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::fmt;

use super::AnalysisError;

/// Longest body prefix quoted in a malformed-JSON error.
pub const SNIPPET_CHARS: usize = 100;

const JSON_WHITESPACE: [char; 4] = [' ', '\t', '\n', '\r'];

/// Wanted fields kept as raw JSON. Everything else in the body is skipped
/// without being decoded, so huge numbers, lone surrogates and deep nesting
/// elsewhere in a valid document never fail the parse.
#[derive(Default)]
struct ResponseShape {
    text: Option<Box<RawValue>>,
    description: Option<Box<RawValue>>,
    result: Option<Box<RawValue>>,
}

enum Field {
    Text,
    Description,
    Result,
    Other,
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: de::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct FieldVisitor;

        impl<'de> Visitor<'de> for FieldVisitor {
            type Value = Field;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object key")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Field, E> {
                Ok(match v {
                    b"text" => Field::Text,
                    b"description" => Field::Description,
                    b"result" => Field::Result,
                    _ => Field::Other,
                })
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Field, E> {
                self.visit_bytes(v.as_bytes())
            }
        }

        // Raw key bytes: escapes are not checked for valid UTF-16.
        d.deserialize_bytes(FieldVisitor)
    }
}

struct ShapeVisitor;

impl<'de> Visitor<'de> for ShapeVisitor {
    type Value = ResponseShape;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ResponseShape, A::Error> {
        let mut shape = ResponseShape::default();
        // Repeated keys: the last one wins.
        while let Some(field) = map.next_key::<Field>()? {
            match field {
                Field::Text => shape.text = Some(map.next_value()?),
                Field::Description => shape.description = Some(map.next_value()?),
                Field::Result => shape.result = Some(map.next_value()?),
                Field::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(shape)
    }
}

/// Decodes a JSON string leniently: invalid escapes such as lone surrogates
/// become U+FFFD.
struct LossyString;

impl<'de> Visitor<'de> for LossyString {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<String, E> {
        Ok(String::from_utf8_lossy(v).into_owned())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }
}

/// Check that `json` is a single JSON document and pull out the wanted
/// fields. `Ok(None)` for anything that is not an object.
fn read_shape(json: &str) -> serde_json::Result<Option<ResponseShape>> {
    let mut de = serde_json::Deserializer::from_str(json);
    let shape = if json.trim_start_matches(JSON_WHITESPACE).starts_with('{') {
        Some((&mut de).deserialize_map(ShapeVisitor)?)
    } else {
        IgnoredAny::deserialize(&mut de)?;
        None
    };
    de.end()?;
    Ok(shape)
}

/// Non-string values (numbers, objects, null) count as absent.
fn string_value(raw: Option<&RawValue>) -> Option<String> {
    let json = raw?.get();
    if !json.starts_with('"') {
        return None;
    }
    let mut de = serde_json::Deserializer::from_str(json);
    (&mut de).deserialize_bytes(LossyString).ok()
}

fn nested_text(raw: Option<&RawValue>) -> Option<String> {
    let shape = read_shape(raw?.get()).ok().flatten()?;
    string_value(shape.text.as_deref())
}

/// Extract the description from a raw response body.
///
/// Returns `Ok(None)` for valid JSON without any of the wanted fields.
pub fn normalize(raw: &str) -> Result<Option<String>, AnalysisError> {
    if raw.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let shape = read_shape(raw).map_err(|e| {
        log::debug!("Response is not JSON: {}", e);
        AnalysisError::MalformedJson {
            snippet: snippet(raw),
        }
    })?;

    // Only objects carry fields; arrays and scalars have nothing to read.
    let Some(shape) = shape else {
        return Ok(None);
    };

    Ok(string_value(shape.text.as_deref())
        .or_else(|| string_value(shape.description.as_deref()))
        .or_else(|| nested_text(shape.result.as_deref())))
}

/// First [`SNIPPET_CHARS`] characters of `raw`, with `…` appended if cut.
fn snippet(raw: &str) -> String {
    match raw.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}…", &raw[..cut]),
        None => raw.to_string(),
    }
}
