// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeOwned, DeserializeSeed, SeqAccess, Visitor};
use serde::{forward_to_deserialize_any, Deserializer};
use std::{fmt, slice};

use crate::convert::FieldValue;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A record deserialization specific error enum
#[derive(Debug, Clone, PartialEq)]
pub enum DeError {
    /// The field value does not fit the requested type
    Expecting {
        /// Requested type
        expected: &'static str,
        /// Value found
        got: String,
    },
    /// Serde specific error
    Custom(String),
}

impl fmt::Display for DeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match *self {
            DeError::Expecting {
                expected,
                ref got,
            } => write!(f, "Expecting {expected}, got {got}"),
            DeError::Custom(ref s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for DeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl de::Error for DeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DeError::Custom(msg.to_string())
    }
}

/// Builds a record from its converted fields, in binding order.
///
/// Blank fields are left out of struct records so that `Option` fields
/// become `None`.
pub(crate) fn from_fields<T: DeserializeOwned>(
    fields: &[(&'static str, FieldValue)],
) -> Result<T, DeError> {
    T::deserialize(RecordDeserializer {
        iter: fields.iter(),
        peek: None,
    })
}

struct RecordDeserializer<'a> {
    iter: slice::Iter<'a, (&'static str, FieldValue)>,
    peek: Option<&'a FieldValue>,
}

impl<'de> serde::Deserializer<'de> for RecordDeserializer<'_> {
    type Error = DeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf option unit unit_struct newtype_struct map struct
        enum identifier ignored_any
    }
}

impl<'de> SeqAccess<'de> for RecordDeserializer<'_> {
    type Error = DeError;

    fn next_element_seed<D>(&mut self, seed: D) -> Result<Option<D::Value>, Self::Error>
    where
        D: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((_, value)) => seed.deserialize(FieldValueDeserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

impl<'de> de::MapAccess<'de> for RecordDeserializer<'_> {
    type Error = DeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        for (name, value) in self.iter.by_ref() {
            if !value.is_empty() {
                self.peek = Some(value);
                let de = BorrowedStrDeserializer::<Self::Error>::new(name);
                return seed.deserialize(de).map(Some);
            }
        }
        Ok(None)
    }

    fn next_value_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<K::Value, Self::Error> {
        let value = self
            .peek
            .take()
            .ok_or_else(|| DeError::Custom("value requested before key".to_string()))?;
        seed.deserialize(FieldValueDeserializer::new(value))
    }
}

macro_rules! deserialize_int {
    ($typ:ty, $method:ident, $visit:ident) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
        where
            V: Visitor<'de>,
        {
            let out_of_range = |got: String| DeError::Expecting {
                expected: stringify!($typ),
                got,
            };
            match self.value {
                FieldValue::Int(v) => {
                    let v = <$typ>::try_from(*v).map_err(|_| out_of_range(v.to_string()))?;
                    visitor.$visit(v)
                }
                FieldValue::Float(v) => {
                    let t = v.trunc();
                    // `MAX as f64` may round up, compare against the next integer instead
                    if t.is_finite() && t >= <$typ>::MIN as f64 && t < <$typ>::MAX as f64 + 1. {
                        visitor.$visit(t as $typ)
                    } else {
                        Err(out_of_range(v.to_string()))
                    }
                }
                FieldValue::Bool(v) => visitor.$visit(*v as u8 as $typ),
                FieldValue::String(ref s) => {
                    let v = s
                        .trim()
                        .parse()
                        .map_err(|_| out_of_range(format!("'{s}'")))?;
                    visitor.$visit(v)
                }
                ref d => Err(out_of_range(format!("{d:?}"))),
            }
        }
    };
}

macro_rules! deserialize_float {
    ($typ:ty, $method:ident, $visit:ident) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
        where
            V: Visitor<'de>,
        {
            match self.value {
                FieldValue::Float(v) => {
                    let n = *v as $typ;
                    if n.is_infinite() && v.is_finite() {
                        return Err(DeError::Expecting {
                            expected: stringify!($typ),
                            got: v.to_string(),
                        });
                    }
                    visitor.$visit(n)
                }
                FieldValue::Int(v) => visitor.$visit(*v as $typ),
                FieldValue::Bool(v) => visitor.$visit(*v as u8 as $typ),
                FieldValue::String(ref s) => {
                    let v = s.trim().parse().map_err(|_| DeError::Expecting {
                        expected: stringify!($typ),
                        got: format!("'{s}'"),
                    })?;
                    visitor.$visit(v)
                }
                ref d => Err(DeError::Expecting {
                    expected: stringify!($typ),
                    got: format!("{d:?}"),
                }),
            }
        }
    };
}

/// A deserializer for a converted [`FieldValue`]
pub struct FieldValueDeserializer<'a> {
    value: &'a FieldValue,
}

impl<'a> FieldValueDeserializer<'a> {
    /// Wraps a field value
    pub fn new(value: &'a FieldValue) -> Self {
        FieldValueDeserializer { value }
    }
}

impl<'de> serde::Deserializer<'de> for FieldValueDeserializer<'_> {
    type Error = DeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            FieldValue::String(v) => visitor.visit_str(v),
            FieldValue::Float(v) => visitor.visit_f64(*v),
            FieldValue::Bool(v) => visitor.visit_bool(*v),
            FieldValue::Int(v) => visitor.visit_i64(*v),
            FieldValue::Empty => visitor.visit_unit(),
            FieldValue::Date(v) => visitor.visit_string(v.to_string()),
            FieldValue::DateTime(v) => visitor.visit_string(v.format(DATETIME_FORMAT).to_string()),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            FieldValue::String(v) => visitor.visit_str(v),
            FieldValue::Empty => visitor.visit_str(""),
            FieldValue::Float(v) => visitor.visit_str(&v.to_string()),
            FieldValue::Int(v) => visitor.visit_str(&v.to_string()),
            FieldValue::Bool(v) => visitor.visit_str(&v.to_string()),
            FieldValue::Date(v) => visitor.visit_str(&v.to_string()),
            FieldValue::DateTime(v) => visitor.visit_str(&v.format(DATETIME_FORMAT).to_string()),
        }
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            FieldValue::String(v) => visitor.visit_bytes(v.as_bytes()),
            FieldValue::Empty => visitor.visit_bytes(&[]),
            ref d => Err(DeError::Expecting {
                expected: "bytes",
                got: format!("{d:?}"),
            }),
        }
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            FieldValue::Bool(v) => visitor.visit_bool(*v),
            FieldValue::String(ref v) => match &**v {
                "TRUE" | "true" | "True" => visitor.visit_bool(true),
                "FALSE" | "false" | "False" => visitor.visit_bool(false),
                d => Err(DeError::Expecting {
                    expected: "bool",
                    got: format!("'{d}'"),
                }),
            },
            FieldValue::Empty => visitor.visit_bool(false),
            FieldValue::Float(v) => visitor.visit_bool(*v != 0.),
            FieldValue::Int(v) => visitor.visit_bool(*v != 0),
            ref d => Err(DeError::Expecting {
                expected: "bool",
                got: format!("{d:?}"),
            }),
        }
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let mut chars = match self.value {
            FieldValue::String(ref s) => s.chars(),
            _ => "".chars(),
        };
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(DeError::Expecting {
                expected: "char",
                got: format!("{:?}", self.value),
            }),
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            FieldValue::Empty => visitor.visit_unit(),
            ref d => Err(DeError::Expecting {
                expected: "unit",
                got: format!("{d:?}"),
            }),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            FieldValue::Empty => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        use serde::de::IntoDeserializer;

        match self.value {
            FieldValue::String(s) => visitor.visit_enum(s.as_str().into_deserializer()),
            ref d => Err(DeError::Expecting {
                expected: "enum",
                got: format!("{d:?}"),
            }),
        }
    }

    deserialize_int!(i64, deserialize_i64, visit_i64);
    deserialize_int!(i32, deserialize_i32, visit_i32);
    deserialize_int!(i16, deserialize_i16, visit_i16);
    deserialize_int!(i8, deserialize_i8, visit_i8);
    deserialize_int!(u64, deserialize_u64, visit_u64);
    deserialize_int!(u32, deserialize_u32, visit_u32);
    deserialize_int!(u16, deserialize_u16, visit_u16);
    deserialize_int!(u8, deserialize_u8, visit_u8);
    deserialize_float!(f64, deserialize_f64, visit_f64);
    deserialize_float!(f32, deserialize_f32, visit_f32);

    forward_to_deserialize_any! {
        unit_struct seq tuple tuple_struct map struct identifier ignored_any
    }
}
