//! Base64 encoded numeric arrays as embedded in model documents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{IsotopeSplineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "little" => Some(Endianness::Little),
            "big" => Some(Endianness::Big),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

/// Floating point width of the encoded values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Precision::Single),
            64 => Some(Precision::Double),
            _ => None,
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            Precision::Single => 32,
            Precision::Double => 64,
        }
    }

    pub fn byte_width(&self) -> usize {
        self.bits() as usize / 8
    }
}

/// Declared layout of one binary array element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryArrayLayout {
    pub endianness: Endianness,
    pub precision: Precision,
    pub length: usize,
}

/// decode a base64 payload into doubles
///
/// Arguments:
///
/// * `text` - base64 text, whitespace is ignored
/// * `endianness` - byte order of the encoded values
/// * `precision` - 32 or 64 bit floats, single precision is widened
///
/// Returns:
///
/// * `Result<Vec<f64>>` - decoded values, or an error for invalid base64 or a truncated value
///
pub fn decode_binary_array(text: &str, endianness: Endianness, precision: Precision) -> Result<Vec<f64>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| IsotopeSplineError::parse(0, format!("invalid base64 payload: {}", e)))?;

    let width = precision.byte_width();
    if bytes.len() % width != 0 {
        return Err(IsotopeSplineError::parse(
            0,
            format!("{} bytes do not form whole {} bit values", bytes.len(), precision.bits()),
        ));
    }

    let values = bytes
        .chunks_exact(width)
        .map(|chunk| match (endianness, precision) {
            (Endianness::Little, Precision::Double) => LittleEndian::read_f64(chunk),
            (Endianness::Big, Precision::Double) => BigEndian::read_f64(chunk),
            (Endianness::Little, Precision::Single) => LittleEndian::read_f32(chunk) as f64,
            (Endianness::Big, Precision::Single) => BigEndian::read_f32(chunk) as f64,
        })
        .collect();

    Ok(values)
}

/// encode doubles as a base64 payload with the given byte order and 64 bit precision
pub fn encode_binary_array(values: &[f64], endianness: Endianness) -> String {
    let mut bytes = vec![0u8; values.len() * 8];
    match endianness {
        Endianness::Little => LittleEndian::write_f64_into(values, &mut bytes),
        Endianness::Big => BigEndian::write_f64_into(values, &mut bytes),
    }
    STANDARD.encode(bytes)
}
