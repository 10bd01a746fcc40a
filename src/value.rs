//! Typed value decoding for parameter and history reads.
//!
//! The device transmits numeric values little-endian, but some device
//! families reorder the bytes of multi-byte values. A [`ByteOrder`] names the
//! source byte for every output position ("3210" reverses a 4-byte value);
//! it is applied before the little-endian interpretation.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder as _, LittleEndian};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RocError, RocResult};
use crate::protocol::PointRef;

/// Declared value type of a parameter or history column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Double,
    /// Fixed length ASCII text; the length comes from the `ParameterSpec`
    Ascii,
}

impl ValueType {
    /// Byte width of numeric types, `None` for ASCII
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ValueType::Int8 | ValueType::UInt8 => Some(1),
            ValueType::Int16 | ValueType::UInt16 => Some(2),
            ValueType::Int32 | ValueType::UInt32 | ValueType::Float => Some(4),
            ValueType::Double => Some(8),
            ValueType::Ascii => None,
        }
    }

    /// History columns can only hold 16/32-bit integers and single floats
    pub fn is_history_type(self) -> bool {
        matches!(self, ValueType::Int16 | ValueType::Int32 | ValueType::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Int8 => "int8",
            ValueType::UInt8 => "uint8",
            ValueType::Int16 => "int16",
            ValueType::UInt16 => "uint16",
            ValueType::Int32 => "int32",
            ValueType::UInt32 => "uint32",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Ascii => "ascii",
        }
    }

    /// Decode `bytes` (already reordered) as this type
    pub fn decode(self, bytes: &[u8]) -> RocResult<Value> {
        if let Some(size) = self.fixed_size() {
            if bytes.len() < size {
                return Err(RocError::invalid_data(format!(
                    "{} needs {} bytes, got {}",
                    self.as_str(),
                    size,
                    bytes.len()
                )));
            }
        }

        let value = match self {
            ValueType::Int8 => Value::Int8(bytes[0] as i8),
            ValueType::UInt8 => Value::UInt8(bytes[0]),
            ValueType::Int16 => Value::Int16(LittleEndian::read_i16(bytes)),
            ValueType::UInt16 => Value::UInt16(LittleEndian::read_u16(bytes)),
            ValueType::Int32 => Value::Int32(LittleEndian::read_i32(bytes)),
            ValueType::UInt32 => Value::UInt32(LittleEndian::read_u32(bytes)),
            ValueType::Float => Value::Float(LittleEndian::read_f32(bytes)),
            ValueType::Double => Value::Double(LittleEndian::read_f64(bytes)),
            ValueType::Ascii => Value::Ascii(decode_ascii(bytes)),
        };
        Ok(value)
    }
}

impl FromStr for ValueType {
    type Err = RocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int8" | "sbyte" => Ok(ValueType::Int8),
            "uint8" | "byte" => Ok(ValueType::UInt8),
            "int16" | "short" => Ok(ValueType::Int16),
            "uint16" | "ushort" => Ok(ValueType::UInt16),
            "int32" | "int" => Ok(ValueType::Int32),
            "uint32" | "uint" => Ok(ValueType::UInt32),
            "float" | "single" => Ok(ValueType::Float),
            "double" => Ok(ValueType::Double),
            "ascii" => Ok(ValueType::Ascii),
            _ => Err(RocError::unknown_value_type(s)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Byte order permutation applied before numeric interpretation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteOrder {
    order: Vec<usize>,
}

impl ByteOrder {
    /// Number of bytes the permutation applies to
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Output byte `i` is input byte `order[i]`
    pub fn apply(&self, bytes: &[u8]) -> RocResult<Vec<u8>> {
        if bytes.len() != self.order.len() {
            return Err(RocError::invalid_data(format!(
                "byte order {} does not fit a {}-byte value",
                self,
                bytes.len()
            )));
        }
        Ok(self.order.iter().map(|&i| bytes[i]).collect())
    }
}

/// Apply an optional byte order, passing bytes through unchanged without one
pub fn reorder(bytes: &[u8], order: Option<&ByteOrder>) -> RocResult<Vec<u8>> {
    match order {
        Some(order) => order.apply(bytes),
        None => Ok(bytes.to_vec()),
    }
}

impl FromStr for ByteOrder {
    type Err = RocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let order = s
            .chars()
            .map(|ch| {
                ch.to_digit(10)
                    .map(|d| d as usize)
                    .ok_or_else(|| RocError::invalid_data(format!("invalid byte order '{}'", s)))
            })
            .collect::<RocResult<Vec<_>>>()?;

        let mut seen = vec![false; order.len()];
        for &i in &order {
            if i >= order.len() || seen[i] {
                return Err(RocError::invalid_data(format!(
                    "byte order '{}' is not a permutation",
                    s
                )));
            }
            seen[i] = true;
        }

        Ok(Self { order })
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in &self.order {
            write!(f, "{}", i)?;
        }
        Ok(())
    }
}

impl Serialize for ByteOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Decoded parameter or history value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    Double(f64),
    Ascii(String),
    /// Device "not applicable" sentinel: the decoded float was not finite
    Infinite,
}

impl Value {
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(v) => v.is_finite(),
            Value::Double(v) => v.is_finite(),
            Value::Infinite => false,
            _ => true,
        }
    }

    /// Replace non-finite floats with [`Value::Infinite`]
    pub fn into_reported(self) -> Self {
        if self.is_finite() {
            self
        } else {
            Value::Infinite
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Ascii(v) => f.write_str(v),
            Value::Infinite => f.write_str("Infinite"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int8(v) => serializer.serialize_i8(*v),
            Value::UInt8(v) => serializer.serialize_u8(*v),
            Value::Int16(v) => serializer.serialize_i16(*v),
            Value::UInt16(v) => serializer.serialize_u16(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::UInt32(v) => serializer.serialize_u32(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Ascii(v) => serializer.serialize_str(v),
            Value::Infinite => serializer.serialize_str("Infinite"),
        }
    }
}

pub(crate) fn decode_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == '\0' || c == ' ')
        .to_string()
}

/// Fixed width numeric types readable by [`crate::RocMaster::get_parameter`]
/// and [`crate::RocMaster::get_history_values`]
pub trait RocValue: Sized + Copy {
    const SIZE: usize;

    /// Interpret the first `SIZE` bytes little-endian
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_roc_value {
    ($($ty:ty => $size:expr, $read:expr;)*) => {
        $(
            impl RocValue for $ty {
                const SIZE: usize = $size;

                fn read_le(bytes: &[u8]) -> Self {
                    $read(bytes)
                }
            }
        )*
    };
}

impl_roc_value! {
    i8 => 1, |b: &[u8]| b[0] as i8;
    u8 => 1, |b: &[u8]| b[0];
    i16 => 2, LittleEndian::read_i16;
    u16 => 2, LittleEndian::read_u16;
    i32 => 4, LittleEndian::read_i32;
    u32 => 4, LittleEndian::read_u32;
    f32 => 4, LittleEndian::read_f32;
    f64 => 8, LittleEndian::read_f64;
}

/// Slice `bytes` into consecutive `T::SIZE` records
pub fn decode_records<T: RocValue>(bytes: &[u8], count: usize) -> RocResult<Vec<T>> {
    let needed = count * T::SIZE;
    if bytes.len() < needed {
        return Err(RocError::invalid_data(format!(
            "expected {} records of {} bytes, got {} bytes",
            count,
            T::SIZE,
            bytes.len()
        )));
    }
    Ok(bytes[..needed].chunks_exact(T::SIZE).map(T::read_le).collect())
}

/// One named parameter to read by opcode 180 or from history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub point: u8,
    pub logic: u8,
    pub param: u8,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_order: Option<ByteOrder>,
    /// Text length for `ascii` values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl ParameterSpec {
    pub fn new<S: Into<String>>(name: S, point: PointRef, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            point: point.point,
            logic: point.logic,
            param: point.param,
            value_type,
            byte_order: None,
            length: None,
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = Some(byte_order);
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn point_ref(&self) -> PointRef {
        PointRef::new(self.point, self.logic, self.param)
    }

    /// Bytes this parameter occupies in an opcode 180 response
    pub fn value_size(&self) -> RocResult<usize> {
        match self.value_type.fixed_size() {
            Some(size) => Ok(size),
            None => self.length.ok_or_else(|| {
                RocError::configuration(format!("ascii parameter '{}' needs a length", self.name))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_parsing() {
        assert_eq!("float".parse::<ValueType>().unwrap(), ValueType::Float);
        assert_eq!("Single".parse::<ValueType>().unwrap(), ValueType::Float);
        assert_eq!("INT16".parse::<ValueType>().unwrap(), ValueType::Int16);
        assert!(matches!(
            "int64".parse::<ValueType>(),
            Err(RocError::UnknownValueType { .. })
        ));
    }

    #[test]
    fn test_byte_order_permutation() {
        let order: ByteOrder = "3210".parse().unwrap();
        assert_eq!(order.apply(&[1, 2, 3, 4]).unwrap(), vec![4, 3, 2, 1]);

        let order: ByteOrder = "1032".parse().unwrap();
        assert_eq!(order.apply(&[1, 2, 3, 4]).unwrap(), vec![2, 1, 4, 3]);
        assert_eq!(order.to_string(), "1032");

        assert!(order.apply(&[1, 2]).is_err());
        assert!("0012".parse::<ByteOrder>().is_err());
        assert!("01a".parse::<ByteOrder>().is_err());
        assert!("04".parse::<ByteOrder>().is_err());
    }

    #[test]
    fn test_decode_float_with_byte_order() {
        let be = 12.5f32.to_be_bytes();
        let order: ByteOrder = "3210".parse().unwrap();
        let bytes = reorder(&be, Some(&order)).unwrap();
        assert_eq!(ValueType::Float.decode(&bytes).unwrap(), Value::Float(12.5));
    }

    #[test]
    fn test_non_finite_reported_as_infinite() {
        let nan = f32::NAN.to_le_bytes();
        let value = ValueType::Float.decode(&nan).unwrap().into_reported();
        assert_eq!(value, Value::Infinite);
        assert_eq!(value.to_string(), "Infinite");
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"Infinite\"");

        let value = ValueType::Int16.decode(&[0xFF, 0x7F]).unwrap().into_reported();
        assert_eq!(value, Value::Int16(i16::MAX));
    }

    #[test]
    fn test_ascii_trimmed() {
        let value = ValueType::Ascii.decode(b"FT-101\0\0  ").unwrap();
        assert_eq!(value, Value::Ascii("FT-101".to_string()));
    }

    #[test]
    fn test_decode_records() {
        let mut bytes = Vec::new();
        for v in [1i16, -2, 300] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode_records::<i16>(&bytes, 3).unwrap(), vec![1, -2, 300]);
        assert!(decode_records::<i32>(&bytes, 2).is_err());
    }

    #[test]
    fn test_parameter_spec_sizes() {
        let spec = ParameterSpec::new("tag", PointRef::new(7, 0, 0), ValueType::Ascii);
        assert!(spec.value_size().is_err());
        assert_eq!(spec.with_length(10).value_size().unwrap(), 10);

        let yaml = "name: pressure\npoint: 3\nlogic: 1\nparam: 21\nvalue_type: float\nbyte_order: \"3210\"\n";
        let spec: ParameterSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.point_ref(), PointRef::new(3, 1, 21));
        assert_eq!(spec.value_size().unwrap(), 4);
        assert_eq!(spec.byte_order.unwrap().to_string(), "3210");
    }
}
