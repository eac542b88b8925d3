use crate::error::Result;
use crate::res::string_pool::StringPool;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A resource identifier laid out as `package(8) | type(8) | entry(16)`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResId(u32);

impl ResId {
    pub fn new(package: u8, ty: u8, entry: u16) -> Self {
        let package = (package as u32) << 24;
        let ty = (ty as u32) << 16;
        let entry = entry as u32;
        Self(package | ty | entry)
    }

    pub fn package(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry(self) -> u16 {
        self.0 as u16
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Package id 0 means "the package this reference lives in".
    pub fn or_package(self, package: u8) -> Self {
        if self.package() == 0 && !self.is_null() {
            Self::new(package, self.type_id(), self.entry())
        } else {
            self
        }
    }
}

impl From<u32> for ResId {
    fn from(r: u32) -> Self {
        Self(r)
    }
}

impl From<ResId> for u32 {
    fn from(r: ResId) -> u32 {
        r.0
    }
}

impl std::fmt::Display for ResId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl std::str::FromStr for ResId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('@');
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16)?,
            None => s.parse()?,
        };
        Ok(Self(value))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ValueType {
    Null = 0x00,
    Reference = 0x01,
    Attribute = 0x02,
    String = 0x03,
    Float = 0x04,
    Dimension = 0x05,
    Fraction = 0x06,
    DynamicReference = 0x07,
    DynamicAttribute = 0x08,
    IntDec = 0x10,
    IntHex = 0x11,
    IntBoolean = 0x12,
    IntColorArgb8 = 0x1c,
    IntColorRgb8 = 0x1d,
    IntColorArgb4 = 0x1e,
    IntColorRgb4 = 0x1f,
}

/// `data` of a null value that stands for an explicitly empty value.
const DATA_NULL_EMPTY: u32 = 1;

const COMPLEX_UNIT_MASK: u32 = 0xf;
const COMPLEX_RADIX_SHIFT: u32 = 4;
const COMPLEX_RADIX_MASK: u32 = 0x3;
const COMPLEX_MANTISSA_MASK: u32 = 0xffff_ff00;
const RADIX_MULTS: [f32; 4] = [
    1.0 / (1 << 8) as f32,
    1.0 / (1 << 15) as f32,
    1.0 / (1 << 23) as f32,
    1.0 / (1u64 << 31) as f32,
];
const DIMENSION_UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
const FRACTION_UNITS: [&str; 2] = ["%", "%p"];

/// A typed `Res_value`. The raw `data` word is interpreted by its type tag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Null,
    Empty,
    Reference(ResId),
    Attribute(ResId),
    /// Index into the string pool owning the value.
    String(u32),
    Float(f32),
    /// Complex-encoded dimension.
    Dimension(u32),
    /// Complex-encoded fraction.
    Fraction(u32),
    DynamicReference(ResId),
    DynamicAttribute(ResId),
    IntDec(i32),
    IntHex(u32),
    Bool(bool),
    ColorArgb8(u32),
    ColorRgb8(u32),
    ColorArgb4(u32),
    ColorRgb4(u32),
    Unknown { ty: u8, data: u32 },
}

impl Value {
    pub fn from_raw(ty: u8, data: u32) -> Self {
        match ty {
            x if x == ValueType::Null as u8 => {
                if data == DATA_NULL_EMPTY {
                    Self::Empty
                } else {
                    Self::Null
                }
            }
            x if x == ValueType::Reference as u8 => Self::Reference(data.into()),
            x if x == ValueType::Attribute as u8 => Self::Attribute(data.into()),
            x if x == ValueType::String as u8 => Self::String(data),
            x if x == ValueType::Float as u8 => Self::Float(f32::from_bits(data)),
            x if x == ValueType::Dimension as u8 => Self::Dimension(data),
            x if x == ValueType::Fraction as u8 => Self::Fraction(data),
            x if x == ValueType::DynamicReference as u8 => Self::DynamicReference(data.into()),
            x if x == ValueType::DynamicAttribute as u8 => Self::DynamicAttribute(data.into()),
            x if x == ValueType::IntDec as u8 => Self::IntDec(data as i32),
            x if x == ValueType::IntHex as u8 => Self::IntHex(data),
            x if x == ValueType::IntBoolean as u8 => Self::Bool(data != 0),
            x if x == ValueType::IntColorArgb8 as u8 => Self::ColorArgb8(data),
            x if x == ValueType::IntColorRgb8 as u8 => Self::ColorRgb8(data),
            x if x == ValueType::IntColorArgb4 as u8 => Self::ColorArgb4(data),
            x if x == ValueType::IntColorRgb4 as u8 => Self::ColorRgb4(data),
            ty => Self::Unknown { ty, data },
        }
    }

    /// The `(type, data)` pair this value was decoded from.
    pub fn to_raw(self) -> (u8, u32) {
        match self {
            Self::Null => (ValueType::Null as u8, 0),
            Self::Empty => (ValueType::Null as u8, DATA_NULL_EMPTY),
            Self::Reference(id) => (ValueType::Reference as u8, id.into()),
            Self::Attribute(id) => (ValueType::Attribute as u8, id.into()),
            Self::String(index) => (ValueType::String as u8, index),
            Self::Float(f) => (ValueType::Float as u8, f.to_bits()),
            Self::Dimension(data) => (ValueType::Dimension as u8, data),
            Self::Fraction(data) => (ValueType::Fraction as u8, data),
            Self::DynamicReference(id) => (ValueType::DynamicReference as u8, id.into()),
            Self::DynamicAttribute(id) => (ValueType::DynamicAttribute as u8, id.into()),
            Self::IntDec(i) => (ValueType::IntDec as u8, i as u32),
            Self::IntHex(data) => (ValueType::IntHex as u8, data),
            Self::Bool(b) => (ValueType::IntBoolean as u8, if b { 0xffff_ffff } else { 0 }),
            Self::ColorArgb8(data) => (ValueType::IntColorArgb8 as u8, data),
            Self::ColorRgb8(data) => (ValueType::IntColorRgb8 as u8, data),
            Self::ColorArgb4(data) => (ValueType::IntColorArgb4 as u8, data),
            Self::ColorRgb4(data) => (ValueType::IntColorRgb4 as u8, data),
            Self::Unknown { ty, data } => (ty, data),
        }
    }

    /// Reads an 8 byte `Res_value`: size, reserved, type, data.
    pub fn read(r: &mut impl Read) -> Result<Self> {
        let _size = r.read_u16::<LittleEndian>()?;
        let _res0 = r.read_u8()?;
        let data_type = r.read_u8()?;
        let data = r.read_u32::<LittleEndian>()?;
        Ok(Self::from_raw(data_type, data))
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        let (data_type, data) = self.to_raw();
        w.write_u16::<LittleEndian>(8)?;
        w.write_u8(0)?;
        w.write_u8(data_type)?;
        w.write_u32::<LittleEndian>(data)?;
        Ok(())
    }

    /// The resource id this value points at, for plain and dynamic references.
    pub fn reference(&self) -> Option<ResId> {
        match *self {
            Self::Reference(id) | Self::DynamicReference(id) if !id.is_null() => Some(id),
            _ => None,
        }
    }

    /// Renders the value as text. Strings are looked up in `strings`; without
    /// a pool, or with a dangling index, they render as `#<index>`.
    pub fn render(&self, strings: Option<&StringPool>) -> String {
        match *self {
            Self::String(index) => match strings.map(|pool| pool.string(index)) {
                Some(Ok(s)) => s.to_string(),
                _ => format!("#{}", index),
            },
            _ => self.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Self::Null | Self::Empty => Ok(()),
            Self::Reference(id) | Self::DynamicReference(id) => write!(f, "@{}", id),
            Self::Attribute(id) | Self::DynamicAttribute(id) => write!(f, "?{}", id),
            Self::String(index) => write!(f, "#{}", index),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::Dimension(data) => {
                let unit = DIMENSION_UNITS
                    .get((data & COMPLEX_UNIT_MASK) as usize)
                    .copied()
                    .unwrap_or("");
                write!(f, "{:?}{}", complex_to_float(data), unit)
            }
            Self::Fraction(data) => {
                let unit = FRACTION_UNITS
                    .get((data & COMPLEX_UNIT_MASK) as usize)
                    .copied()
                    .unwrap_or("");
                write!(f, "{:?}{}", complex_to_float(data) * 100.0, unit)
            }
            Self::IntDec(i) => write!(f, "{}", i),
            Self::IntHex(data) => write!(f, "0x{:08x}", data),
            Self::Bool(b) => write!(f, "{}", b),
            Self::ColorArgb8(data)
            | Self::ColorRgb8(data)
            | Self::ColorArgb4(data)
            | Self::ColorRgb4(data) => write!(f, "#{:08x}", data),
            Self::Unknown { ty, data } => write!(f, "(type 0x{:02x})0x{:08x}", ty, data),
        }
    }
}

/// Decodes the fixed-point mantissa of a complex dimension or fraction.
fn complex_to_float(data: u32) -> f32 {
    let radix = (data >> COMPLEX_RADIX_SHIFT) & COMPLEX_RADIX_MASK;
    let mantissa = (data & COMPLEX_MANTISSA_MASK) as i32;
    mantissa as f32 * RADIX_MULTS[radix as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn res_id_parts() {
        let id = ResId::from(0x7f02_0001);
        assert_eq!(id.package(), 0x7f);
        assert_eq!(id.type_id(), 0x02);
        assert_eq!(id.entry(), 0x0001);
        assert_eq!(ResId::new(0x7f, 2, 1), id);
        assert_eq!(id.to_string(), "0x7f020001");
        assert_eq!("@0x7f020001".parse::<ResId>().unwrap(), id);
    }

    #[test]
    fn package_zero_is_rewritten() {
        let id = ResId::from(0x0003_0002);
        assert_eq!(id.or_package(0x7f), ResId::from(0x7f03_0002));
        assert_eq!(ResId::from(0x0103_0002).or_package(0x7f), ResId::from(0x0103_0002));
        assert!(ResId::default().or_package(0x7f).is_null());
    }

    #[test]
    fn unknown_tags_degrade_gracefully() {
        let value = Value::from_raw(0x42, 7);
        assert_eq!(value, Value::Unknown { ty: 0x42, data: 7 });
        assert_eq!(value.to_raw(), (0x42, 7));
    }

    #[test]
    fn renders_numeric_types() {
        assert_eq!(Value::IntDec(-3).to_string(), "-3");
        assert_eq!(Value::IntHex(0x10).to_string(), "0x00000010");
        assert_eq!(Value::from_raw(0x12, 0xffff_ffff).to_string(), "true");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::ColorArgb8(0xff00_ff00).to_string(), "#ff00ff00");
        assert_eq!(Value::Reference(ResId::from(0x7f02_0001)).to_string(), "@0x7f020001");
        assert_eq!(Value::Attribute(ResId::from(0x0101_0000)).to_string(), "?0x01010000");
        assert_eq!(Value::Empty.to_string(), "");
    }

    #[test]
    fn renders_complex_units() {
        // 16dip: mantissa 16, radix 23p0, unit dip.
        let dip = (16 << 8) | 1;
        assert_eq!(Value::Dimension(dip).to_string(), "16.0dip");
        // 1.5sp: mantissa 192 with radix 16p7 is 192/128.
        let sp = ((3 << 6) << 8) | (1 << 4) | 2;
        assert_eq!(Value::Dimension(sp).to_string(), "1.5sp");
        // 50%: 0.5 in radix 0p23.
        let half = ((1 << 22) << 8) | (3 << 4);
        assert_eq!(Value::Fraction(half).to_string(), "50.0%");
    }

    #[test]
    fn read_write_value() {
        let mut buf = vec![];
        Value::IntDec(42).write(&mut buf).unwrap();
        assert_eq!(buf, [8, 0, 0, 0x10, 42, 0, 0, 0]);
        let value = Value::read(&mut buf.as_slice()).unwrap();
        assert_eq!(value, Value::IntDec(42));
    }
}
