//! Serializable resource state.
//!
//! `ResourceState` is the tree the encoding driver produces and the codecs
//! consume: an id, a self URI, ordered properties and ordered members.
//! `LazyResourceState` wraps a request body that is decoded at most once, on
//! first access.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::codec::{CodecError, ResourceCodecManager};
use crate::request::MediaType;
use crate::resource::Resource;

/// A property value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(SystemTime),
    Uri(String),
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
    State(ResourceState),
    /// Reference to another resource; the encoding driver expands it or
    /// turns it into a link.
    Resource(Arc<dyn Resource>),
    /// Raw bytes. Not encodable inside a state tree.
    Bytes(Bytes),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&ResourceState> {
        match self {
            Value::State(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Date(d) => write!(f, "Date({:?})", d),
            Value::Uri(u) => write!(f, "Uri({:?})", u),
            Value::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Value::List(l) => f.debug_tuple("List").field(l).finish(),
            Value::State(s) => f.debug_tuple("State").field(s).finish(),
            Value::Resource(r) => write!(f, "Resource({})", r.uri()),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Uri(a), Value::Uri(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::State(a), Value::State(b)) => a == b,
            (Value::Resource(a), Value::Resource(b)) => Arc::ptr_eq(a, b),
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<ResourceState> for Value {
    fn from(s: ResourceState) -> Self {
        Value::State(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

/// Tree-shaped snapshot of a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceState {
    id: Option<String>,
    uri: Option<String>,
    properties: Vec<(String, Value)>,
    members: Vec<ResourceState>,
    binary: Option<Bytes>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Raw-buffer state produced by the octet-stream passthrough.
    pub fn binary(content: Bytes) -> Self {
        Self {
            binary: Some(content),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = Some(uri.into());
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Insert or replace a property. Replacing keeps the original position.
    pub fn put_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        let idx = self.properties.iter().position(|(k, _)| k == name)?;
        Some(self.properties.remove(idx).1)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(k, _)| k.as_str())
    }

    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    pub fn members(&self) -> &[ResourceState] {
        &self.members
    }

    pub fn add_member(&mut self, member: ResourceState) {
        self.members.push(member);
    }

    pub fn binary_content(&self) -> Option<&Bytes> {
        self.binary.as_ref()
    }
}

enum Content {
    Empty,
    Raw(Bytes),
    Decoded(ResourceState),
}

/// Request body state that decodes on first access.
pub struct LazyResourceState {
    codecs: Arc<ResourceCodecManager>,
    content_type: MediaType,
    content: Content,
    content_length: u64,
    streamed: bool,
}

impl LazyResourceState {
    pub fn new(codecs: Arc<ResourceCodecManager>, content_type: MediaType) -> Self {
        Self {
            codecs,
            content_type,
            content: Content::Empty,
            content_length: 0,
            streamed: false,
        }
    }

    pub fn content_type(&self) -> &MediaType {
        &self.content_type
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// True when the body was streamed straight to a binary resource instead
    /// of being buffered here.
    pub fn has_big_content(&self) -> bool {
        self.streamed
    }

    /// Install the fully accumulated body. Replaces any earlier content.
    pub fn set_content(&mut self, content: Bytes) {
        self.content_length = content.len() as u64;
        self.content = Content::Raw(content);
    }

    pub(crate) fn mark_streamed(&mut self, total: u64) {
        self.streamed = true;
        self.content_length = total;
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self.content, Content::Decoded(_))
    }

    /// Decoded view of the body. The first call runs the codec; later calls
    /// return the cached state.
    pub fn state(&mut self) -> Result<&mut ResourceState, CodecError> {
        let decoded = match &self.content {
            Content::Raw(raw) => Some(self.codecs.decode(&self.content_type, raw)?),
            Content::Empty => Some(self.codecs.decode(&self.content_type, &[])?),
            Content::Decoded(_) => None,
        };
        if let Some(decoded) = decoded {
            self.content = Content::Decoded(decoded);
        }
        match &mut self.content {
            Content::Decoded(state) => Ok(state),
            _ => unreachable!("content decoded above"),
        }
    }
}

impl fmt::Debug for LazyResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = match &self.content {
            Content::Empty => "empty",
            Content::Raw(_) => "raw",
            Content::Decoded(_) => "decoded",
        };
        f.debug_struct("LazyResourceState")
            .field("content_type", &self.content_type)
            .field("content", &content)
            .field("content_length", &self.content_length)
            .finish()
    }
}
