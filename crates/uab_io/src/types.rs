//! Scalar types shared by the readers and writers.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Byte order applied to scalar fields and string lengths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first
    #[default]
    Little,

    /// Most significant byte first
    Big,
}

impl Endian {
    /// Decode the one byte endianness flag stored in serialized files, where zero means little endian
    pub fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    /// The one byte flag representation of this byte order
    pub fn as_flag(self) -> u8 {
        match self {
            Endian::Little => 0,
            Endian::Big => 1,
        }
    }

    pub fn is_big(self) -> bool {
        self == Endian::Big
    }
}

/// Fixed width scalar that can be read or written in either byte order
pub trait Primitive: Sized + Copy {
    /// Width on disk in bytes
    const SIZE: u64;

    fn read_with<R: Read>(reader: &mut R, endian: Endian) -> io::Result<Self>;

    fn write_with<W: Write>(self, writer: &mut W, endian: Endian) -> io::Result<()>;
}

macro_rules! primitive {
    ($ty:ty, $read:ident, $write:ident) => {
        impl Primitive for $ty {
            const SIZE: u64 = std::mem::size_of::<$ty>() as u64;

            fn read_with<R: Read>(reader: &mut R, endian: Endian) -> io::Result<Self> {
                match endian {
                    Endian::Big => reader.$read::<BigEndian>(),
                    Endian::Little => reader.$read::<LittleEndian>(),
                }
            }

            fn write_with<W: Write>(self, writer: &mut W, endian: Endian) -> io::Result<()> {
                match endian {
                    Endian::Big => writer.$write::<BigEndian>(self),
                    Endian::Little => writer.$write::<LittleEndian>(self),
                }
            }
        }
    };
}

impl Primitive for u8 {
    const SIZE: u64 = 1;

    fn read_with<R: Read>(reader: &mut R, _: Endian) -> io::Result<Self> {
        reader.read_u8()
    }

    fn write_with<W: Write>(self, writer: &mut W, _: Endian) -> io::Result<()> {
        writer.write_u8(self)
    }
}

impl Primitive for i8 {
    const SIZE: u64 = 1;

    fn read_with<R: Read>(reader: &mut R, _: Endian) -> io::Result<Self> {
        reader.read_i8()
    }

    fn write_with<W: Write>(self, writer: &mut W, _: Endian) -> io::Result<()> {
        writer.write_i8(self)
    }
}

primitive!(u16, read_u16, write_u16);
primitive!(i16, read_i16, write_i16);
primitive!(u32, read_u32, write_u32);
primitive!(i32, read_i32, write_i32);
primitive!(u64, read_u64, write_u64);
primitive!(i64, read_i64, write_i64);
primitive!(f32, read_f32, write_f32);
primitive!(f64, read_f64, write_f64);

/// 128-bit decimal stored as four 32-bit words: low, middle and high mantissa then flags
///
/// The flags word holds the scale (power of ten divisor) in bits 16..24 and the sign in bit 31.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub lo: u32,
    pub mid: u32,
    pub hi: u32,
    pub flags: u32,
}

impl Decimal {
    pub fn scale(&self) -> u32 {
        (self.flags >> 16) & 0xFF
    }

    pub fn is_negative(&self) -> bool {
        self.flags & 0x8000_0000 != 0
    }

    /// The unscaled 96-bit magnitude
    pub fn mantissa(&self) -> u128 {
        ((self.hi as u128) << 64) | ((self.mid as u128) << 32) | self.lo as u128
    }

    /// Lossy conversion to a double
    pub fn to_f64(&self) -> f64 {
        let value = self.mantissa() as f64 / 10f64.powi(self.scale() as i32);
        if self.is_negative() {
            -value
        } else {
            value
        }
    }
}

/// Widen an IEEE 754 binary16 value to `f32`
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 1) as u32;
    let exponent = ((bits >> 10) & 0x1F) as u32;
    let mantissa = (bits & 0x3FF) as u32;

    let out = match (exponent, mantissa) {
        (0, 0) => sign << 31,
        (0, _) => {
            // subnormal, renormalise into the wider exponent range
            let mut e = 1i32;
            let mut m = mantissa;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            m &= 0x3FF;
            (sign << 31) | (((e + 127 - 15) as u32) << 23) | (m << 13)
        }
        (0x1F, _) => (sign << 31) | 0x7F80_0000 | (mantissa << 13),
        _ => (sign << 31) | ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };

    f32::from_bits(out)
}

/// Narrow an `f32` to IEEE 754 binary16, rounding to nearest even
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x7F_FFFF;

    if exponent == 0xFF {
        return sign | 0x7C00 | if mantissa != 0 { 0x200 } else { 0 };
    }

    let e = exponent - 127 + 15;
    if e >= 0x1F {
        return sign | 0x7C00;
    }

    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = mantissa | 0x80_0000;
        let shift = (14 - e) as u32;
        let half = 1u32 << (shift - 1);
        let rounded = (m + half - 1 + ((m >> shift) & 1)) >> shift;
        return sign | rounded as u16;
    }

    let half_mantissa = mantissa >> 13;
    let round_bits = mantissa & 0x1FFF;
    let mut out = (sign as u32) | ((e as u32) << 10) | half_mantissa;
    if round_bits > 0x1000 || (round_bits == 0x1000 && half_mantissa & 1 == 1) {
        out += 1;
    }
    out as u16
}
