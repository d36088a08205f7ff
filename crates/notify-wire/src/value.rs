//! Generic bus argument values.
//!
//! The bus carries positional, typed arguments. [`Arg`] models the subset
//! of wire types the notification protocol uses as a sum type. Each
//! accessor either yields the typed payload or a
//! [`WireError::UnexpectedType`] naming the offending position.

use std::collections::BTreeMap;

use crate::WireError;

/// One positional bus argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// `q` — unsigned 16-bit integer.
    U16(u16),
    /// `i` — signed 32-bit integer.
    I32(i32),
    /// `s` — UTF-8 string.
    Str(String),
    /// `ay` — byte array.
    Bytes(Vec<u8>),
    /// `a{iv}` — sparse integer-keyed variant dictionary.
    AttrDict(BTreeMap<i32, Arg>),
    /// `a{ss}` — string-keyed string dictionary.
    StrDict(BTreeMap<String, String>),
    /// `a(ss)` — ordered array of string pairs.
    StructArray(Vec<(String, String)>),
}

impl Arg {
    /// Wire-type name used in decode error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Arg::U16(_) => "q",
            Arg::I32(_) => "i",
            Arg::Str(_) => "s",
            Arg::Bytes(_) => "ay",
            Arg::AttrDict(_) => "a{iv}",
            Arg::StrDict(_) => "a{ss}",
            Arg::StructArray(_) => "a(ss)",
        }
    }

    fn unexpected(&self, field: &'static str, expected: &'static str) -> WireError {
        WireError::UnexpectedType {
            field,
            expected,
            found: self.type_name(),
        }
    }

    pub fn as_u16(&self, field: &'static str) -> Result<u16, WireError> {
        match self {
            Arg::U16(v) => Ok(*v),
            other => Err(other.unexpected(field, "q")),
        }
    }

    pub fn as_i32(&self, field: &'static str) -> Result<i32, WireError> {
        match self {
            Arg::I32(v) => Ok(*v),
            other => Err(other.unexpected(field, "i")),
        }
    }

    pub fn as_str(&self, field: &'static str) -> Result<&str, WireError> {
        match self {
            Arg::Str(v) => Ok(v),
            other => Err(other.unexpected(field, "s")),
        }
    }

    /// As [`Arg::as_str`], but additionally rejects empty strings.
    pub fn as_non_empty_str(&self, field: &'static str) -> Result<&str, WireError> {
        let s = self.as_str(field)?;
        if s.is_empty() {
            return Err(WireError::EmptyField { field });
        }
        Ok(s)
    }

    pub fn as_bytes(&self, field: &'static str) -> Result<&[u8], WireError> {
        match self {
            Arg::Bytes(v) => Ok(v),
            other => Err(other.unexpected(field, "ay")),
        }
    }

    pub fn as_attr_dict(&self, field: &'static str) -> Result<&BTreeMap<i32, Arg>, WireError> {
        match self {
            Arg::AttrDict(v) => Ok(v),
            other => Err(other.unexpected(field, "a{iv}")),
        }
    }

    pub fn as_str_dict(&self, field: &'static str) -> Result<&BTreeMap<String, String>, WireError> {
        match self {
            Arg::StrDict(v) => Ok(v),
            other => Err(other.unexpected(field, "a{ss}")),
        }
    }

    pub fn as_struct_array(&self, field: &'static str) -> Result<&[(String, String)], WireError> {
        match self {
            Arg::StructArray(v) => Ok(v),
            other => Err(other.unexpected(field, "a(ss)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_yield_typed_payloads() {
        assert_eq!(Arg::U16(7).as_u16("version").unwrap(), 7);
        assert_eq!(Arg::I32(-4).as_i32("messageId").unwrap(), -4);
        assert_eq!(Arg::Str("x".into()).as_str("deviceId").unwrap(), "x");
        assert_eq!(Arg::Bytes(vec![1, 2]).as_bytes("appId").unwrap(), &[1, 2]);
    }

    #[test]
    fn accessor_mismatch_names_position_and_types() {
        let err = Arg::Str("x".into()).as_u16("version").unwrap_err();
        match err {
            WireError::UnexpectedType {
                field,
                expected,
                found,
            } => {
                assert_eq!(field, "version");
                assert_eq!(expected, "q");
                assert_eq!(found, "s");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_string_rejected_where_required() {
        assert!(matches!(
            Arg::Str(String::new()).as_non_empty_str("deviceName"),
            Err(WireError::EmptyField {
                field: "deviceName"
            })
        ));
    }
}
