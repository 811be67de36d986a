//! Codec registry and response negotiation.

use bytes::Bytes;

use crate::codec::{html, json, CodecError, ResourceCodec};
use crate::request::{MediaType, MediaTypeMatcher};
use crate::resource::{ResourceResponse, ResourceState};

/// Negotiated media type plus the encoded body. `body` is `None` for
/// binary resources, whose content is streamed instead.
#[derive(Debug, Clone)]
pub struct EncodingResult {
    pub media_type: MediaType,
    pub body: Option<Bytes>,
}

/// Ordered registry of codecs. Registration order breaks negotiation ties.
#[derive(Debug, Default, Clone)]
pub struct ResourceCodecManager {
    codecs: Vec<(MediaType, ResourceCodec)>,
}

impl ResourceCodecManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON first, then HTML.
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.register(MediaType::json(), json::codec());
        manager.register(MediaType::html(), html::codec());
        manager
    }

    /// Register `codec` for `media_type`, replacing an earlier registration.
    pub fn register(&mut self, media_type: MediaType, codec: ResourceCodec) {
        match self.codecs.iter_mut().find(|(m, _)| *m == media_type) {
            Some(slot) => slot.1 = codec,
            None => self.codecs.push((media_type, codec)),
        }
    }

    pub fn media_types(&self) -> Vec<MediaType> {
        self.codecs.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn codec(&self, media_type: &MediaType) -> Option<&ResourceCodec> {
        self.codecs
            .iter()
            .find(|(m, _)| m == media_type)
            .map(|(_, c)| c)
    }

    /// Media type for a path extension, if a codec is registered for it.
    pub fn media_type_for_extension(&self, ext: &str) -> Option<MediaType> {
        MediaType::from_extension(ext).filter(|m| self.codec(m).is_some())
    }

    pub fn decode(&self, media_type: &MediaType, content: &[u8]) -> Result<ResourceState, CodecError> {
        if *media_type == MediaType::octet_stream() {
            return Ok(ResourceState::binary(Bytes::copy_from_slice(content)));
        }
        match self.codec(media_type) {
            Some(codec) if codec.has_decoder() => codec.decode(content),
            _ => Err(CodecError::UnsupportedMediaType(media_type.to_string())),
        }
    }

    /// Pick the response media type and encode the response state.
    pub fn encode(
        &self,
        matcher: &MediaTypeMatcher,
        response: &ResourceResponse,
    ) -> Result<EncodingResult, CodecError> {
        if let Some(binary) = response.resource().and_then(|r| r.clone().as_binary()) {
            let offered = binary.media_type();
            return match matcher.find_best_match(std::slice::from_ref(&offered)) {
                Some(media_type) => Ok(EncodingResult {
                    media_type,
                    body: None,
                }),
                None => Err(CodecError::IncompatibleMediaType {
                    offered: offered.to_string(),
                }),
            };
        }

        let best = matcher.find_best_match(&self.media_types());
        if best.is_none() && !response.is_error() {
            return Err(CodecError::UnsupportedMediaType(
                "no registered media type is acceptable".into(),
            ));
        }

        let (media_type, codec) = match best
            .as_ref()
            .and_then(|m| self.codec(m).filter(|c| c.has_encoder()).map(|c| (m.clone(), c)))
        {
            Some(found) => found,
            None => {
                let json = MediaType::json();
                let codec = self
                    .codec(&json)
                    .filter(|c| c.has_encoder())
                    .ok_or_else(|| CodecError::UnsupportedMediaType(json.to_string()))?;
                (json, codec)
            }
        };

        let state = response.state().cloned().unwrap_or_default();
        let body = codec.encode(&state)?;
        Ok(EncodingResult {
            media_type,
            body: Some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ResourceError};
    use crate::request::{RequestContext, RequestType};
    use crate::resource::memory::{InMemoryBinary, InMemoryObject};
    use crate::resource::{ResourcePath, ResponseType};
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        RequestContext::builder(RequestType::Read, ResourcePath::parse("/x")).build()
    }

    fn matcher(accept: &str) -> MediaTypeMatcher {
        MediaTypeMatcher::parse(Some(accept), None).unwrap()
    }

    #[test]
    fn octet_stream_decodes_to_binary_state() {
        let manager = ResourceCodecManager::with_defaults();
        let state = manager.decode(&MediaType::octet_stream(), b"\x00\x01").unwrap();
        assert_eq!(state.binary_content().map(|b| b.len()), Some(2));
    }

    #[test]
    fn decoding_without_decoder_is_unsupported() {
        let manager = ResourceCodecManager::with_defaults();
        let err = manager.decode(&MediaType::html(), b"<p>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);
        let err = manager
            .decode(&MediaType::parse("application/xml").unwrap(), b"<a/>")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);
    }

    #[test]
    fn unacceptable_media_fails_only_for_non_errors() {
        let manager = ResourceCodecManager::with_defaults();
        let resource = InMemoryObject::root("x");
        let mut ok = ResourceResponse::new(ctx(), ResponseType::Read, resource);
        ok.set_state(ResourceState::with_id("x"));
        let err = manager.encode(&matcher("application/xml"), &ok).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);

        let failed = ResourceResponse::error(ctx(), ResourceError::no_such_resource("x"));
        let result = manager.encode(&matcher("application/xml"), &failed).unwrap();
        assert_eq!(result.media_type, MediaType::json());
    }

    #[test]
    fn binary_resources_negotiate_their_own_type() {
        let manager = ResourceCodecManager::with_defaults();
        let binary = InMemoryBinary::root("blob", MediaType::parse("image/png").unwrap(), b"png".to_vec());
        let response = ResourceResponse::new(ctx(), ResponseType::Read, binary);

        let result = manager.encode(&matcher("image/*"), &response).unwrap();
        assert_eq!(result.media_type.essence(), "image/png");
        assert!(result.body.is_none());

        let err = manager.encode(&matcher("application/json"), &response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleMediaType);
    }

    #[test]
    fn encoder_less_match_falls_back_to_json() {
        let mut manager = ResourceCodecManager::with_defaults();
        manager.register(MediaType::html(), ResourceCodec::new());
        let resource: Arc<dyn crate::resource::Resource> = InMemoryObject::root("x");
        let mut response = ResourceResponse::new(ctx(), ResponseType::Read, resource);
        response.set_state(ResourceState::with_id("x"));
        let result = manager.encode(&matcher("text/html"), &response).unwrap();
        assert_eq!(result.media_type, MediaType::json());
    }
}
