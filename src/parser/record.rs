//! Decodes a single TensorBoard `Event` protobuf payload into a
//! [`ParsedEvent`](crate::model::hparam::ParsedEvent).
//!
//! Field numbers are pinned by spec section 4.A and must not drift:
//! `Event{wall_time:1, step:2, file_version:3, summary:5}`,
//! `Summary{value:1}`, `Summary.Value{tag:1, simple_value:2, tensor:8,
//! metadata:9}`, `Tensor{dtype:1, string_val:8}`.

use super::wire::{for_each_field, WireValue};
use crate::error::Result;
use crate::model::hparam::ParsedEvent;

const DT_STRING: u64 = 7;

/// Decode one `Event` payload (the bytes inside a record's length field,
/// CRC already verified by the caller).
pub fn decode_event(buf: &[u8]) -> Result<ParsedEvent> {
    let mut event = ParsedEvent::default();
    let mut summary_bytes: Option<&[u8]> = None;

    for_each_field(buf, |field, value| {
        match (field, value) {
            (1, WireValue::Fixed64(bits)) => event.wall_time = f64::from_bits(bits),
            (2, WireValue::Varint(v)) => event.step = v as i64,
            (5, WireValue::LengthDelimited(data)) => summary_bytes = Some(data),
            _ => {}
        }
        Ok(())
    })?;

    if let Some(summary) = summary_bytes {
        decode_summary(summary, &mut event)?;
    }
    Ok(event)
}

fn decode_summary(buf: &[u8], event: &mut ParsedEvent) -> Result<()> {
    for_each_field(buf, |field, value| {
        if field == 1 {
            if let WireValue::LengthDelimited(data) = value {
                decode_value(data, event)?;
            }
        }
        Ok(())
    })
}

fn decode_value(buf: &[u8], event: &mut ParsedEvent) -> Result<()> {
    let mut tag: Option<String> = None;
    let mut simple_value: Option<f32> = None;
    let mut tensor_bytes: Option<&[u8]> = None;

    for_each_field(buf, |field, value| {
        match (field, value) {
            (1, WireValue::LengthDelimited(data)) => {
                tag = Some(String::from_utf8_lossy(data).into_owned());
            }
            (2, WireValue::Fixed32(bits)) => simple_value = Some(f32::from_bits(bits)),
            (8, WireValue::LengthDelimited(data)) => tensor_bytes = Some(data),
            _ => {}
        }
        Ok(())
    })?;

    let tag = match tag {
        Some(t) => t,
        None => return Ok(()),
    };
    event.tags.push(tag.clone());

    if let Some(v) = simple_value {
        event.scalars.insert(tag.clone(), v);
    }
    if let Some(tensor) = tensor_bytes {
        if let Some(text) = decode_tensor_string(tensor)? {
            event.texts.insert(tag, text);
        }
    }
    Ok(())
}

/// Decode a `Tensor` message, returning its string value only if
/// `dtype == DT_STRING`. Non-string tensors carry no hyperparameter
/// content the extractor understands, so they're dropped here rather than
/// downstream.
fn decode_tensor_string(buf: &[u8]) -> Result<Option<String>> {
    let mut dtype: Option<u64> = None;
    let mut string_val: Option<Vec<u8>> = None;

    for_each_field(buf, |field, value| {
        match (field, value) {
            (1, WireValue::Varint(v)) => dtype = Some(v),
            (8, WireValue::LengthDelimited(data)) => string_val = Some(data.to_vec()),
            _ => {}
        }
        Ok(())
    })?;

    if dtype == Some(DT_STRING) {
        if let Some(bytes) = string_val {
            return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::writer::encode_event_payload;

    #[test]
    fn decodes_wall_time_and_step() {
        let payload = encode_event_payload(1_700_000_000.5, 3, &[], &[]);
        let event = decode_event(&payload).unwrap();
        assert_eq!(event.step, 3);
        assert!((event.wall_time - 1_700_000_000.5).abs() < 1e-9);
    }

    #[test]
    fn decodes_scalar_and_text_values() {
        let payload = encode_event_payload(1.0, 0, &[("loss", 0.5)], &[("lr/text_summary", "0.001")]);
        let event = decode_event(&payload).unwrap();
        assert_eq!(event.scalars.get("loss"), Some(&0.5));
        assert_eq!(
            event.texts.get("lr/text_summary").map(String::as_str),
            Some("0.001")
        );
        assert!(event.tags.contains(&"loss".to_string()));
        assert!(event.tags.contains(&"lr/text_summary".to_string()));
    }
}
