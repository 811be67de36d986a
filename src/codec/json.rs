//! `application/json` codec.
//!
//! Wire form of a resource:
//! `{"id": .., "self": {"href": ..}, <properties>, "members": [..]}`.

use std::time::SystemTime;

use bytes::Bytes;
use serde_json::{Map, Number, Value as Json};

use crate::codec::{epoch_millis, CodecError, Decoder, Encoder, ResourceCodec};
use crate::resource::{ResourceState, Value};

pub fn codec() -> ResourceCodec {
    ResourceCodec::new()
        .with_encoder(|| Box::new(JsonEncoder::new()) as Box<dyn Encoder>)
        .with_decoder(JsonDecoder)
}

enum Frame {
    Object(Map<String, Json>),
    Array(Vec<Json>),
    Members(Vec<Json>),
}

/// Builds a JSON document from encoder events.
#[derive(Default)]
pub struct JsonEncoder {
    stack: Vec<Frame>,
    keys: Vec<String>,
    root: Option<Json>,
}

impl JsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, value: Json) -> Result<(), CodecError> {
        match self.stack.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(CodecError::Encode("more than one top-level value".into()));
                }
                self.root = Some(value);
            }
            Some(Frame::Object(map)) => {
                let key = self
                    .keys
                    .last()
                    .ok_or_else(|| CodecError::Encode("value written outside a property".into()))?;
                map.insert(key.clone(), value);
            }
            Some(Frame::Array(items)) | Some(Frame::Members(items)) => items.push(value),
        }
        Ok(())
    }

    fn pop_object(&mut self) -> Result<Map<String, Json>, CodecError> {
        match self.stack.pop() {
            Some(Frame::Object(map)) => Ok(map),
            _ => Err(CodecError::Encode("unbalanced object".into())),
        }
    }

    fn pop_array(&mut self) -> Result<Vec<Json>, CodecError> {
        match self.stack.pop() {
            Some(Frame::Array(items)) => Ok(items),
            _ => Err(CodecError::Encode("unbalanced list".into())),
        }
    }
}

impl Encoder for JsonEncoder {
    fn start_resource(&mut self, id: Option<&str>, uri: Option<&str>) -> Result<(), CodecError> {
        let mut map = Map::new();
        if let Some(id) = id {
            map.insert("id".into(), Json::String(id.to_string()));
        }
        if let Some(uri) = uri {
            let mut link = Map::new();
            link.insert("href".into(), Json::String(uri.to_string()));
            map.insert("self".into(), Json::Object(link));
        }
        self.stack.push(Frame::Object(map));
        Ok(())
    }

    fn end_resource(&mut self) -> Result<(), CodecError> {
        let map = self.pop_object()?;
        self.insert(Json::Object(map))
    }

    fn start_properties(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn end_properties(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn start_property(&mut self, name: &str) -> Result<(), CodecError> {
        self.keys.push(name.to_string());
        Ok(())
    }

    fn end_property(&mut self, _name: &str) -> Result<(), CodecError> {
        self.keys.pop();
        Ok(())
    }

    fn start_members(&mut self) -> Result<(), CodecError> {
        self.stack.push(Frame::Members(Vec::new()));
        Ok(())
    }

    fn end_members(&mut self) -> Result<(), CodecError> {
        let members = match self.stack.pop() {
            Some(Frame::Members(members)) => members,
            _ => return Err(CodecError::Encode("unbalanced members".into())),
        };
        match self.stack.last_mut() {
            Some(Frame::Object(map)) => {
                map.insert("members".into(), Json::Array(members));
                Ok(())
            }
            _ => Err(CodecError::Encode("members outside a resource".into())),
        }
    }

    fn start_list(&mut self) -> Result<(), CodecError> {
        self.stack.push(Frame::Array(Vec::new()));
        Ok(())
    }

    fn end_list(&mut self) -> Result<(), CodecError> {
        let items = self.pop_array()?;
        self.insert(Json::Array(items))
    }

    fn start_map(&mut self) -> Result<(), CodecError> {
        self.stack.push(Frame::Object(Map::new()));
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), CodecError> {
        let map = self.pop_object()?;
        self.insert(Json::Object(map))
    }

    fn write_null(&mut self) -> Result<(), CodecError> {
        self.insert(Json::Null)
    }

    fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.insert(Json::Bool(value))
    }

    fn write_integer(&mut self, value: i64) -> Result<(), CodecError> {
        self.insert(Json::Number(value.into()))
    }

    fn write_float(&mut self, value: f64) -> Result<(), CodecError> {
        let number = Number::from_f64(value)
            .ok_or_else(|| CodecError::NonEncodableValue(format!("float {}", value)))?;
        self.insert(Json::Number(number))
    }

    fn write_text(&mut self, value: &str) -> Result<(), CodecError> {
        self.insert(Json::String(value.to_string()))
    }

    fn write_date(&mut self, value: SystemTime) -> Result<(), CodecError> {
        self.insert(Json::Number(epoch_millis(value).into()))
    }

    fn finish(self: Box<Self>) -> Result<Bytes, CodecError> {
        if !self.stack.is_empty() {
            return Err(CodecError::Encode("document ended inside a structure".into()));
        }
        let root = self.root.unwrap_or(Json::Null);
        serde_json::to_vec(&root)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}

/// Decodes a JSON object into a state. Anything that is not an object
/// decodes to an empty state.
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, content: &[u8]) -> Result<ResourceState, CodecError> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResourceState::new());
        }
        let parsed: Json =
            serde_json::from_slice(content).map_err(|e| CodecError::Malformed(e.to_string()))?;
        match parsed {
            Json::Object(map) => Ok(state_from_object(map)),
            _ => Ok(ResourceState::new()),
        }
    }
}

fn state_from_object(map: Map<String, Json>) -> ResourceState {
    let mut state = ResourceState::new();
    for (key, value) in map {
        match (key.as_str(), value) {
            ("id", Json::String(id)) => state.set_id(id),
            ("id", Json::Number(n)) => state.set_id(n.to_string()),
            ("self", _) => {}
            ("members", Json::Array(members)) => {
                for member in members {
                    if let Json::Object(m) = member {
                        state.add_member(state_from_object(m));
                    }
                }
            }
            (_, value) => state.put_property(key, value_from_json(value)),
        }
    }
    state
}

fn value_from_json(value: Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::List(items.into_iter().map(value_from_json).collect()),
        Json::Object(map) => Value::State(state_from_object(map)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nested_objects_and_numbers() {
        let state = JsonDecoder
            .decode(br#"{"id":"a","self":{"href":"/x"},"n":3,"r":1.5,"owner":{"name":"b"},"tags":["t"]}"#)
            .unwrap();
        assert_eq!(state.id(), Some("a"));
        assert!(state.property("self").is_none());
        assert_eq!(state.property("n"), Some(&Value::Integer(3)));
        assert_eq!(state.property("r"), Some(&Value::Float(1.5)));
        let owner = state.property("owner").and_then(Value::as_state).unwrap();
        assert_eq!(owner.property("name").and_then(Value::as_str), Some("b"));
        assert_eq!(state.property("tags").and_then(Value::as_list).map(|l| l.len()), Some(1));
    }

    #[test]
    fn empty_and_non_object_bodies_decode_to_empty_state() {
        assert_eq!(JsonDecoder.decode(b"").unwrap(), ResourceState::new());
        assert_eq!(JsonDecoder.decode(b"  \n").unwrap(), ResourceState::new());
        assert_eq!(JsonDecoder.decode(b"[1,2]").unwrap(), ResourceState::new());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            JsonDecoder.decode(b"{\"id\":"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn encodes_wire_form_in_order() {
        let mut state = ResourceState::with_id("a");
        state.set_uri("/coll/a");
        state.put_property("name", "n");
        state.add_member(ResourceState::with_id("m"));
        let bytes = codec().encode(&state).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"id":"a","self":{"href":"/coll/a"},"name":"n","members":[{"id":"m"}]}"#
        );
    }
}
