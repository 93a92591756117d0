use std::str::FromStr;

use crate::Error;

/// Pixel data type of a raster band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    #[default]
    Byte,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
    CInt16,
    CInt32,
    CFloat32,
    CFloat64,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::Int8 => "Int8",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::UInt64 => "UInt64",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::CInt16 => "CInt16",
            DataType::CInt32 => "CInt32",
            DataType::CFloat32 => "CFloat32",
            DataType::CFloat64 => "CFloat64",
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::CInt16 | DataType::CInt32 | DataType::CFloat32 | DataType::CFloat64)
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, DataType::Float32 | DataType::Float64 | DataType::CFloat32 | DataType::CFloat64)
    }

    /// Range of representable (real) values
    pub fn range(&self) -> (f64, f64) {
        match self {
            DataType::Byte => (u8::MIN as f64, u8::MAX as f64),
            DataType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::UInt16 => (u16::MIN as f64, u16::MAX as f64),
            DataType::Int16 | DataType::CInt16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::UInt32 => (u32::MIN as f64, u32::MAX as f64),
            DataType::Int32 | DataType::CInt32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::UInt64 => (u64::MIN as f64, u64::MAX as f64),
            DataType::Int64 => (i64::MIN as f64, i64::MAX as f64),
            DataType::Float32 | DataType::CFloat32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::Float64 | DataType::CFloat64 => (f64::MIN, f64::MAX),
        }
    }

    /// True if the value can be stored without clamping or rounding
    pub fn can_represent(&self, value: f64) -> bool {
        if value.is_nan() || value.is_infinite() {
            return !self.is_integer();
        }

        let (min, max) = self.range();
        value >= min && value <= max && (!self.is_integer() || value.fract() == 0.0)
    }

    /// Converts a value to the closest value representable by this type
    pub fn clamp(&self, value: f64) -> f64 {
        if !self.is_integer() {
            return match self {
                DataType::Float32 | DataType::CFloat32 if value.is_finite() => (value as f32) as f64,
                _ => value,
            };
        }

        if value.is_nan() {
            return 0.0;
        }

        let (min, max) = self.range();
        value.round().clamp(min, max)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            DataType::Byte,
            DataType::Int8,
            DataType::UInt16,
            DataType::Int16,
            DataType::UInt32,
            DataType::Int32,
            DataType::UInt64,
            DataType::Int64,
            DataType::Float32,
            DataType::Float64,
            DataType::CInt16,
            DataType::CInt32,
            DataType::CFloat32,
            DataType::CFloat64,
        ]
        .into_iter()
        .find(|dt| dt.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| Error::InvalidArgument(format!("Unknown output pixel type: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() -> crate::Result<()> {
        assert_eq!("byte".parse::<DataType>()?, DataType::Byte);
        assert_eq!("Float32".parse::<DataType>()?, DataType::Float32);
        assert!("Float16x".parse::<DataType>().is_err());
        Ok(())
    }

    #[test]
    fn representable_values() {
        assert!(DataType::Byte.can_represent(255.0));
        assert!(!DataType::Byte.can_represent(-1.0));
        assert!(!DataType::Int16.can_represent(0.5));
        assert!(DataType::Float32.can_represent(f64::NAN));
        assert_eq!(DataType::Byte.clamp(300.0), 255.0);
        assert_eq!(DataType::Int8.clamp(-200.0), -128.0);
        assert_eq!(DataType::UInt16.clamp(12.6), 13.0);
    }
}
