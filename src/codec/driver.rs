//! Turns a `ResourceState` tree into encoder events.

use crate::codec::{CodecError, Encoder};
use crate::resource::{ResourceState, Value};

pub fn encode_state(encoder: &mut dyn Encoder, state: &ResourceState) -> Result<(), CodecError> {
    if state.binary_content().is_some() {
        return Err(CodecError::NonEncodableValue(
            "binary state inside an encoded document".into(),
        ));
    }
    encoder.start_resource(state.id(), state.uri())?;
    encoder.start_properties()?;
    for (name, value) in state.properties() {
        encoder.start_property(name)?;
        encode_value(encoder, value)?;
        encoder.end_property(name)?;
    }
    encoder.end_properties()?;
    if !state.members().is_empty() {
        encoder.start_members()?;
        for member in state.members() {
            encode_state(encoder, member)?;
        }
        encoder.end_members()?;
    }
    encoder.end_resource()
}

fn encode_value(encoder: &mut dyn Encoder, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Null => encoder.write_null(),
        Value::Bool(b) => encoder.write_bool(*b),
        Value::Integer(i) => encoder.write_integer(*i),
        Value::Float(x) if x.is_finite() => encoder.write_float(*x),
        Value::Float(x) => Err(CodecError::NonEncodableValue(format!("float {}", x))),
        Value::Text(s) | Value::Uri(s) => encoder.write_text(s),
        Value::Date(d) => encoder.write_date(*d),
        Value::Map(map) => {
            encoder.start_map()?;
            for (key, v) in map {
                encoder.start_property(key)?;
                encode_value(encoder, v)?;
                encoder.end_property(key)?;
            }
            encoder.end_map()
        }
        Value::List(items) => {
            encoder.start_list()?;
            for item in items {
                encode_value(encoder, item)?;
            }
            encoder.end_list()
        }
        Value::State(nested) => encode_state(encoder, nested),
        Value::Resource(r) => Err(CodecError::NonEncodableValue(format!(
            "unexpanded resource reference {}",
            r.uri()
        ))),
        Value::Bytes(b) => Err(CodecError::NonEncodableValue(format!(
            "{} bytes of raw content",
            b.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json::JsonEncoder;
    use bytes::Bytes;

    fn encode(state: &ResourceState) -> Result<String, CodecError> {
        let mut encoder: Box<dyn Encoder> = Box::new(JsonEncoder::new());
        encode_state(encoder.as_mut(), state)?;
        let bytes = encoder.finish()?;
        Ok(String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn rejects_raw_bytes_and_non_finite_floats() {
        let mut state = ResourceState::with_id("a");
        state.put_property("blob", Value::Bytes(Bytes::from_static(b"xy")));
        assert!(matches!(encode(&state), Err(CodecError::NonEncodableValue(_))));

        let mut state = ResourceState::with_id("a");
        state.put_property("ratio", f64::NAN);
        assert!(matches!(encode(&state), Err(CodecError::NonEncodableValue(_))));
    }

    #[test]
    fn members_follow_properties() {
        let mut state = ResourceState::with_id("coll");
        state.put_property("count", 1i64);
        state.add_member(ResourceState::with_id("m1"));
        let json = encode(&state).unwrap();
        assert!(json.find("count").unwrap() < json.find("members").unwrap());
    }
}
