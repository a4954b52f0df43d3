//! A minimal TensorBoard event writer.
//!
//! Spec section 4.A notes that event files are produced by "the official
//! TensorBoard writer and the system's own test writer" — this is the
//! latter. It encodes exactly the fields [`record::decode_event`] knows
//! how to read, framed per the CRC32-C scheme in [`crate::parser::crc`].
//! It exists so the parser can be exercised against conformant bytes
//! without a TensorBoard installation, and is not meant as a general
//! protobuf encoder.

use super::crc::masked_crc32c;

fn encode_varint(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn tag(field: u32, wire_type: u8) -> u64 {
    ((field as u64) << 3) | (wire_type as u64)
}

fn write_length_delimited(field: u32, data: &[u8], out: &mut Vec<u8>) {
    encode_varint(tag(field, 2), out);
    encode_varint(data.len() as u64, out);
    out.extend_from_slice(data);
}

fn write_varint_field(field: u32, v: u64, out: &mut Vec<u8>) {
    encode_varint(tag(field, 0), out);
    encode_varint(v, out);
}

fn write_fixed64_field(field: u32, v: u64, out: &mut Vec<u8>) {
    encode_varint(tag(field, 1), out);
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_fixed32_field(field: u32, v: u32, out: &mut Vec<u8>) {
    encode_varint(tag(field, 5), out);
    out.extend_from_slice(&v.to_le_bytes());
}

/// Encode a `Tensor{dtype=7 (DT_STRING), string_val=[text]}` message.
fn encode_string_tensor(text: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint_field(1, 7, &mut buf);
    write_length_delimited(8, text.as_bytes(), &mut buf);
    buf
}

/// Encode one `Summary.Value{tag, simple_value?, tensor?}` message.
fn encode_value(name: &str, scalar: Option<f32>, text: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::new();
    write_length_delimited(1, name.as_bytes(), &mut buf);
    if let Some(v) = scalar {
        write_fixed32_field(2, v.to_bits(), &mut buf);
    }
    if let Some(t) = text {
        let tensor = encode_string_tensor(t);
        write_length_delimited(8, &tensor, &mut buf);
    }
    buf
}

/// Encode one unframed `Event{wall_time, step, summary}` payload.
pub fn encode_event_payload(
    wall_time: f64,
    step: i64,
    scalars: &[(&str, f32)],
    texts: &[(&str, &str)],
) -> Vec<u8> {
    let mut summary = Vec::new();
    for (name, v) in scalars {
        let value = encode_value(name, Some(*v), None);
        write_length_delimited(1, &value, &mut summary);
    }
    for (name, t) in texts {
        let value = encode_value(name, None, Some(t));
        write_length_delimited(1, &value, &mut summary);
    }

    let mut event = Vec::new();
    write_fixed64_field(1, wall_time.to_bits(), &mut event);
    write_varint_field(2, step as u64, &mut event);
    if !summary.is_empty() {
        write_length_delimited(5, &summary, &mut event);
    }
    event
}

/// Frame a payload per spec 4.A: `len(8) | len_crc(4) | payload | payload_crc(4)`.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u64;
    let len_bytes = len.to_le_bytes();
    let len_crc = masked_crc32c(&len_bytes);
    let payload_crc = masked_crc32c(payload);

    let mut out = Vec::with_capacity(8 + 4 + payload.len() + 4);
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(&len_crc.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&payload_crc.to_le_bytes());
    out
}

/// Encode and frame a full event record in one step.
pub fn write_event(
    wall_time: f64,
    step: i64,
    scalars: &[(&str, f32)],
    texts: &[(&str, &str)],
) -> Vec<u8> {
    frame(&encode_event_payload(wall_time, step, scalars, texts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::record::decode_event;

    #[test]
    fn round_trips_through_the_decoder() {
        let payload = encode_event_payload(42.5, 7, &[("loss", 0.25)], &[]);
        let event = decode_event(&payload).unwrap();
        assert_eq!(event.step, 7);
        assert_eq!(event.scalars.get("loss"), Some(&0.25));
    }
}
