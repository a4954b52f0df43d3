//! Minimal protobuf wire-format decoding.
//!
//! The record parser only needs to read a handful of known fields out of
//! the TensorBoard `Event`/`Summary`/`Tensor` messages; this module is not
//! a general protobuf library. It knows the wire-type rules well enough to
//! step over any field it doesn't recognize, which is what lets the parser
//! tolerate writer versions that add fields it has never heard of.

use crate::error::{Error, Result};

/// A decoded field value, tagged by the wire type it came from.
#[derive(Debug, Clone, Copy)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Fixed32(u32),
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| Error::Protobuf("truncated varint".into()))?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::Protobuf("varint too long".into()));
        }
    }
}

/// Walk every top-level field in `buf`, calling `visit` with its field
/// number and decoded value. Unknown field numbers are still decoded (so
/// `pos` advances correctly) and simply passed to the visitor, which is
/// free to ignore them — this is the "skip unknown fields" rule from the
/// wire-type table, expressed as "decode but don't act on it".
pub fn for_each_field<'a>(
    buf: &'a [u8],
    mut visit: impl FnMut(u32, WireValue<'a>) -> Result<()>,
) -> Result<()> {
    let mut pos = 0usize;
    while pos < buf.len() {
        let tag = read_varint(buf, &mut pos)?;
        let field_number = (tag >> 3) as u32;
        let wire_type = (tag & 0x7) as u8;
        match wire_type {
            0 => {
                let v = read_varint(buf, &mut pos)?;
                visit(field_number, WireValue::Varint(v))?;
            }
            1 => {
                let bytes = buf
                    .get(pos..pos + 8)
                    .ok_or_else(|| Error::Protobuf("truncated fixed64".into()))?;
                pos += 8;
                let v = u64::from_le_bytes(bytes.try_into().unwrap());
                visit(field_number, WireValue::Fixed64(v))?;
            }
            2 => {
                let len = read_varint(buf, &mut pos)? as usize;
                let data = buf
                    .get(pos..pos + len)
                    .ok_or_else(|| Error::Protobuf("truncated length-delimited field".into()))?;
                pos += len;
                visit(field_number, WireValue::LengthDelimited(data))?;
            }
            5 => {
                let bytes = buf
                    .get(pos..pos + 4)
                    .ok_or_else(|| Error::Protobuf("truncated fixed32".into()))?;
                pos += 4;
                let v = u32::from_le_bytes(bytes.try_into().unwrap());
                visit(field_number, WireValue::Fixed32(v))?;
            }
            other => {
                return Err(Error::Protobuf(format!("unsupported wire type {other}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_bytes(field: u32, value: u64) -> Vec<u8> {
        let tag = (field << 3) as u64;
        let mut buf = Vec::new();
        encode_varint(tag, &mut buf);
        encode_varint(value, &mut buf);
        buf
    }

    fn encode_varint(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    #[test]
    fn decodes_a_single_varint_field() {
        let buf = varint_bytes(2, 42);
        let mut seen = None;
        for_each_field(&buf, |field, value| {
            if let WireValue::Varint(v) = value {
                seen = Some((field, v));
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, Some((2, 42)));
    }

    #[test]
    fn skips_unknown_field_numbers_without_stalling() {
        let mut buf = varint_bytes(99, 7);
        buf.extend(varint_bytes(2, 5));
        let mut known = Vec::new();
        for_each_field(&buf, |field, value| {
            if field == 2 {
                if let WireValue::Varint(v) = value {
                    known.push(v);
                }
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(known, vec![5]);
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let buf = [0x80u8];
        let result = for_each_field(&buf, |_, _| Ok(()));
        assert!(result.is_err());
    }
}
