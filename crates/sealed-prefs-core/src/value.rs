use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// A value held by a backing store.
///
/// Plain stores keep every variant; the encrypting decorator only ever writes
/// `String` and `StringSet` (ciphertext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    String(String),
    StringSet(BTreeSet<String>),
    Int(i32),
    Long(i64),
    Float(#[serde(with = "float_repr")] f32),
    Bool(bool),
}

/// Discriminant of a [`StoredValue`], used in type errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    StringSet,
    Int,
    Long,
    Float,
    Bool,
}

impl StoredValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            StoredValue::String(_) => ValueKind::String,
            StoredValue::StringSet(_) => ValueKind::StringSet,
            StoredValue::Int(_) => ValueKind::Int,
            StoredValue::Long(_) => ValueKind::Long,
            StoredValue::Float(_) => ValueKind::Float,
            StoredValue::Bool(_) => ValueKind::Bool,
        }
    }

    /// Canonical string form of a scalar value. Sets have none.
    ///
    /// Integers are decimal, floats use the shortest representation that
    /// parses back to the same `f32`, booleans are `true`/`false`.
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            StoredValue::String(s) => Some(s.clone()),
            StoredValue::StringSet(_) => None,
            StoredValue::Int(v) => Some(v.to_string()),
            StoredValue::Long(v) => Some(v.to_string()),
            StoredValue::Float(v) => Some(v.to_string()),
            StoredValue::Bool(v) => Some(v.to_string()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::StringSet => "string set",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// JSON has no NaN or infinity, so non-finite floats travel as their
/// `Display` string (`NaN`, `inf`, `-inf`). Finite floats stay numbers.
mod float_repr {
    use std::fmt;

    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else {
            serializer.collect_str(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl de::Visitor<'_> for FloatVisitor {
        type Value = f32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a float or one of \"NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f32, E> {
            v.parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_strings_parse_back() {
        assert_eq!(StoredValue::Int(-42).canonical_string().as_deref(), Some("-42"));
        assert_eq!(
            StoredValue::Long(i64::MAX).canonical_string().as_deref(),
            Some("9223372036854775807")
        );
        assert_eq!(StoredValue::Bool(true).canonical_string().as_deref(), Some("true"));

        let float = StoredValue::Float(123.456).canonical_string().expect("scalar");
        assert_eq!(float, "123.456");
        assert_eq!(float.parse::<f32>().expect("parse"), 123.456_f32);
    }

    #[test]
    fn string_sets_have_no_canonical_string() {
        let set = StoredValue::StringSet(BTreeSet::from(["a".to_string()]));
        assert_eq!(set.canonical_string(), None);
        assert_eq!(set.kind(), ValueKind::StringSet);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&StoredValue::Int(7)).expect("serialize");
        assert_eq!(json, r#"{"type":"int","value":7}"#);
        let back: StoredValue = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, StoredValue::Int(7));
    }

    #[test]
    fn non_finite_floats_survive_json() {
        for value in [f32::INFINITY, f32::NEG_INFINITY] {
            let json = serde_json::to_string(&StoredValue::Float(value)).expect("serialize");
            let back: StoredValue = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, StoredValue::Float(value));
        }

        let json = serde_json::to_string(&StoredValue::Float(f32::NAN)).expect("serialize");
        assert_eq!(json, r#"{"type":"float","value":"NaN"}"#);
        match serde_json::from_str(&json).expect("deserialize") {
            StoredValue::Float(v) => assert!(v.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn finite_floats_stay_json_numbers() {
        let json = serde_json::to_string(&StoredValue::Float(1.5)).expect("serialize");
        assert_eq!(json, r#"{"type":"float","value":1.5}"#);

        let whole: StoredValue =
            serde_json::from_str(r#"{"type":"float","value":2}"#).expect("deserialize");
        assert_eq!(whole, StoredValue::Float(2.0));
        assert!(serde_json::from_str::<StoredValue>(r#"{"type":"float","value":"x"}"#).is_err());
    }
}
