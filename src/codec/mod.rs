//! Codecs: media-type keyed encoders and decoders for resource state.
//!
//! # Data Flow
//! ```text
//! request body ──decode(media type)──▶ ResourceState
//!
//! ResourceState ──driver──▶ Encoder events ──▶ encoded bytes
//!                   (start_resource, start_property, write_*, ...)
//! ```
//!
//! # Design Decisions
//! - Encoders are event sinks; the driver in `driver.rs` is the only code
//!   that knows how a state tree maps onto events.
//! - A registration may have an encoder, a decoder, or both.
//! - `application/octet-stream` is never registered: decoding it is a
//!   built-in passthrough and binary responses bypass encoding entirely.

pub mod driver;
pub mod html;
pub mod json;
pub mod manager;

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::{ErrorKind, ResourceError};
use crate::resource::ResourceState;

pub use manager::{EncodingResult, ResourceCodecManager};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("resource offers {offered}, which the client does not accept")]
    IncompatibleMediaType { offered: String },

    #[error("malformed body: {0}")]
    Malformed(String),

    #[error("value cannot be encoded: {0}")]
    NonEncodableValue(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("response exceeds size limit of {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            CodecError::IncompatibleMediaType { .. } => ErrorKind::IncompatibleMediaType,
            CodecError::Malformed(_) => ErrorKind::InvalidRequest,
            CodecError::NonEncodableValue(_)
            | CodecError::Encode(_)
            | CodecError::ResponseTooLarge { .. } => ErrorKind::NotAcceptable,
        }
    }
}

impl From<CodecError> for ResourceError {
    fn from(err: CodecError) -> Self {
        ResourceError::with_message(err.kind(), err.to_string()).with_cause(err)
    }
}

/// Receives the structure of a state tree as a sequence of events.
pub trait Encoder: Send {
    fn start_resource(&mut self, id: Option<&str>, uri: Option<&str>) -> Result<(), CodecError>;
    fn end_resource(&mut self) -> Result<(), CodecError>;

    fn start_properties(&mut self) -> Result<(), CodecError>;
    fn end_properties(&mut self) -> Result<(), CodecError>;
    fn start_property(&mut self, name: &str) -> Result<(), CodecError>;
    fn end_property(&mut self, name: &str) -> Result<(), CodecError>;

    fn start_members(&mut self) -> Result<(), CodecError>;
    fn end_members(&mut self) -> Result<(), CodecError>;

    fn start_list(&mut self) -> Result<(), CodecError>;
    fn end_list(&mut self) -> Result<(), CodecError>;

    /// Maps reuse `start_property`/`end_property` for their keys.
    fn start_map(&mut self) -> Result<(), CodecError>;
    fn end_map(&mut self) -> Result<(), CodecError>;

    fn write_null(&mut self) -> Result<(), CodecError>;
    fn write_bool(&mut self, value: bool) -> Result<(), CodecError>;
    fn write_integer(&mut self, value: i64) -> Result<(), CodecError>;
    fn write_float(&mut self, value: f64) -> Result<(), CodecError>;
    fn write_text(&mut self, value: &str) -> Result<(), CodecError>;
    fn write_date(&mut self, value: SystemTime) -> Result<(), CodecError>;

    /// Finish the document and return its bytes.
    fn finish(self: Box<Self>) -> Result<Bytes, CodecError>;
}

pub trait Decoder: Send + Sync {
    fn decode(&self, content: &[u8]) -> Result<ResourceState, CodecError>;
}

pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn Encoder> + Send + Sync>;

/// An encoder factory and/or a decoder registered for one media type.
#[derive(Clone, Default)]
pub struct ResourceCodec {
    encoder: Option<EncoderFactory>,
    decoder: Option<Arc<dyn Decoder>>,
}

impl ResourceCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Encoder> + Send + Sync + 'static,
    {
        self.encoder = Some(Arc::new(factory));
        self
    }

    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Run the driver over `state` with a fresh encoder.
    pub fn encode(&self, state: &ResourceState) -> Result<Bytes, CodecError> {
        let factory = self
            .encoder
            .as_ref()
            .ok_or_else(|| CodecError::Encode("codec has no encoder".into()))?;
        let mut encoder = factory();
        driver::encode_state(encoder.as_mut(), state)?;
        encoder.finish()
    }

    pub fn decode(&self, content: &[u8]) -> Result<ResourceState, CodecError> {
        let decoder = self
            .decoder
            .as_ref()
            .ok_or_else(|| CodecError::Malformed("codec has no decoder".into()))?;
        decoder.decode(content)
    }
}

impl std::fmt::Debug for ResourceCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCodec")
            .field("encoder", &self.has_encoder())
            .field("decoder", &self.has_decoder())
            .finish()
    }
}

/// Milliseconds since the Unix epoch; negative for earlier instants.
pub(crate) fn epoch_millis(value: SystemTime) -> i64 {
    match value.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}
