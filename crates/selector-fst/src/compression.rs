// Variable-length integer and float codec used by every binary blob.
//
// Unsigned integers are LEB128 (7 bits per byte, low bits first, high bit set
// on every byte but the last). Signed integers are zigzag-mapped first.
//
// Floats are stored exactly as `mantissa * 2^exponent` with the mantissa's
// trailing zero bits stripped, so small integral weights take two bytes.
// Non-finite values use the otherwise-unused (mantissa 0, exponent 1) marker
// followed by the raw bit pattern.

use std::io::{Read, Write};

use crate::FstError;

pub fn write_varint<W: Write>(out: &mut W, mut value: u64) -> Result<(), FstError> {
    let mut buf = [0u8; 10];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    out.write_all(&buf[..len])?;
    Ok(())
}

pub fn read_varint<R: Read>(input: &mut R) -> Result<u64, FstError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = read_u8(input)?;
        let low = u64::from(byte & 0x7F);
        if shift >= 64 || (shift == 63 && low > 1) {
            return Err(FstError::VarintOverflow);
        }
        value |= low << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

pub fn write_signed<W: Write>(out: &mut W, value: i64) -> Result<(), FstError> {
    write_varint(out, ((value << 1) ^ (value >> 63)) as u64)
}

pub fn read_signed<R: Read>(input: &mut R) -> Result<i64, FstError> {
    let raw = read_varint(input)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

/// Write a `usize` length or index.
pub fn write_len<W: Write>(out: &mut W, value: usize) -> Result<(), FstError> {
    write_varint(out, value as u64)
}

/// Read a `usize` length or index, rejecting values that do not fit.
pub fn read_len<R: Read>(input: &mut R) -> Result<usize, FstError> {
    usize::try_from(read_varint(input)?).map_err(|_| FstError::VarintOverflow)
}

pub fn write_f64<W: Write>(out: &mut W, value: f64) -> Result<(), FstError> {
    if !value.is_finite() {
        write_signed(out, 0)?;
        write_signed(out, 1)?;
        return write_varint(out, value.to_bits());
    }
    let (mantissa, exponent) = decompose(value);
    write_signed(out, mantissa)?;
    write_signed(out, i64::from(exponent))
}

pub fn read_f64<R: Read>(input: &mut R) -> Result<f64, FstError> {
    let mantissa = read_signed(input)?;
    let exponent = read_signed(input)?;
    if mantissa == 0 {
        if exponent == 1 {
            return Ok(f64::from_bits(read_varint(input)?));
        }
        return Ok(0.0);
    }
    let exponent = i32::try_from(exponent).map_err(|_| FstError::VarintOverflow)?;
    // Split the scaling so neither factor over- or underflows for any finite value.
    let half = exponent / 2;
    Ok(mantissa as f64 * 2f64.powi(half) * 2f64.powi(exponent - half))
}

pub fn write_str<W: Write>(out: &mut W, s: &str) -> Result<(), FstError> {
    write_len(out, s.len())?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

pub fn read_str<R: Read>(input: &mut R) -> Result<String, FstError> {
    let len = read_len(input)?;
    let mut bytes = Vec::new();
    input.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(FstError::UnexpectedEof);
    }
    String::from_utf8(bytes)
        .map_err(|_| FstError::InvalidSymbolTable("string is not valid UTF-8".to_string()))
}

pub(crate) fn read_u8<R: Read>(input: &mut R) -> Result<u8, FstError> {
    let mut b = [0u8; 1];
    input.read_exact(&mut b)?;
    Ok(b[0])
}

/// Split a finite non-zero float into an odd integer mantissa and a binary exponent.
fn decompose(value: f64) -> (i64, i32) {
    if value == 0.0 {
        return (0, 0);
    }
    let bits = value.to_bits();
    let negative = bits >> 63 == 1;
    let biased = ((bits >> 52) & 0x7FF) as i32;
    let fraction = bits & 0x000F_FFFF_FFFF_FFFF;
    let (mut mantissa, mut exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1 << 52), biased - 1075)
    };
    let tz = mantissa.trailing_zeros();
    mantissa >>= tz;
    exponent += tz as i32;
    let mantissa = mantissa as i64;
    (if negative { -mantissa } else { mantissa }, exponent)
}
