//! Generic values decoded against a TypeTree

use derive_more::From;
use indexmap::IndexMap;

/// Field map of a composite, in declaration order
pub type Fields = IndexMap<String, Value>;

/// A decoded value of any schema
#[derive(Debug, Clone, PartialEq, From)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    /// Raw bytes: `TypelessData`, arrays of `UInt8` and strings that are not valid UTF-8
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Entries of a `map` in stored order, duplicate keys are kept
    Map(Vec<(Value, Value)>),
    Object(Fields),
}

impl Value {
    /// Name of the variant, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "SInt8",
            Value::U8(_) => "UInt8",
            Value::I16(_) => "SInt16",
            Value::U16(_) => "UInt16",
            Value::I32(_) => "SInt32",
            Value::U32(_) => "UInt32",
            Value::I64(_) => "SInt64",
            Value::U64(_) => "UInt64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    /// Look up a field of a composite
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Follow a `/` separated path of field names
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |value, segment| value.get(segment))
    }

    /// The value as a signed integer, for any integer variant that fits
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::U8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// The value as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// The fields of a composite
    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }
}

#[cfg(feature = "serde")]
mod serialize {
    use serde::ser::{Serialize, SerializeSeq, Serializer};

    use super::Value;

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Bool(v) => serializer.serialize_bool(*v),
                Value::I8(v) => serializer.serialize_i8(*v),
                Value::U8(v) => serializer.serialize_u8(*v),
                Value::I16(v) => serializer.serialize_i16(*v),
                Value::U16(v) => serializer.serialize_u16(*v),
                Value::I32(v) => serializer.serialize_i32(*v),
                Value::U32(v) => serializer.serialize_u32(*v),
                Value::I64(v) => serializer.serialize_i64(*v),
                Value::U64(v) => serializer.serialize_u64(*v),
                Value::F32(v) => serializer.serialize_f32(*v),
                Value::F64(v) => serializer.serialize_f64(*v),
                Value::String(v) => serializer.serialize_str(v),
                Value::Bytes(v) => serializer.serialize_bytes(v),
                Value::Array(items) => items.serialize(serializer),
                Value::Map(entries) => {
                    let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                    for (key, value) in entries {
                        seq.serialize_element(&(key, value))?;
                    }
                    seq.end()
                }
                Value::Object(fields) => fields.serialize(serializer),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use crate::value::Value;

    fn sample() -> Value {
        let mut inner = IndexMap::new();
        inner.insert("m_FileID".to_owned(), Value::I32(0));
        inner.insert("m_PathID".to_owned(), Value::I64(-7));

        let mut fields = IndexMap::new();
        fields.insert("m_Name".to_owned(), Value::from("Cube".to_owned()));
        fields.insert("m_GameObject".to_owned(), Value::Object(inner));
        fields.insert(
            "m_Container".to_owned(),
            Value::Map(vec![
                (Value::from("a".to_owned()), Value::I32(1)),
                (Value::from("a".to_owned()), Value::I32(2)),
            ]),
        );
        Value::Object(fields)
    }

    #[test]
    fn pointer_follows_fields() {
        let value = sample();
        assert_eq!(value.pointer("m_GameObject/m_PathID").and_then(Value::as_i64), Some(-7));
        assert_eq!(value.pointer("m_Name").and_then(Value::as_str), Some("Cube"));
        assert_eq!(value.pointer("m_Missing"), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_to_json() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"m_Name":"Cube","m_GameObject":{"m_FileID":0,"m_PathID":-7},"m_Container":[["a",1],["a",2]]}"#
        );
    }
}
