//! Media types and Accept-header negotiation.

use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MediaTypeError {
    #[error("malformed media type: {0:?}")]
    Malformed(String),

    #[error("malformed quality value in {0:?}")]
    BadQuality(String),
}

/// A `type/subtype` pair plus parameters. Equality ignores parameters.
#[derive(Debug, Clone)]
pub struct MediaType {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    pub fn new(kind: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            kind: kind.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn json() -> Self {
        Self::new("application", "json")
    }

    pub fn html() -> Self {
        Self::new("text", "html")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    pub fn any() -> Self {
        Self::new("*", "*")
    }

    pub fn parse(raw: &str) -> Result<Self, MediaTypeError> {
        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (kind, subtype) = essence
            .split_once('/')
            .ok_or_else(|| MediaTypeError::Malformed(raw.to_string()))?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() || (kind == "*" && subtype != "*") {
            return Err(MediaTypeError::Malformed(raw.to_string()));
        }
        let mut media = Self::new(kind, subtype);
        for param in parts.map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = param
                .split_once('=')
                .ok_or_else(|| MediaTypeError::Malformed(raw.to_string()))?;
            media
                .params
                .push((k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()));
        }
        Ok(media)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == "*" || self.subtype == "*"
    }

    /// Whether this (possibly wildcard) range covers `other`.
    pub fn includes(&self, other: &MediaType) -> bool {
        (self.kind == "*" || self.kind == other.kind)
            && (self.subtype == "*" || self.subtype == other.subtype)
    }

    /// Media type conventionally associated with a path extension.
    pub fn from_extension(ext: &str) -> Option<MediaType> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::json()),
            "html" | "htm" => Some(Self::html()),
            _ => None,
        }
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.subtype == other.subtype
    }
}

impl Eq for MediaType {}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.subtype.hash(state);
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

#[derive(Debug, Clone)]
struct AcceptEntry {
    range: MediaType,
    quality: f32,
}

/// Chooses a response media type from the Accept header and an optional
/// path extension. Selection depends only on those inputs and the candidate
/// list.
#[derive(Debug, Clone)]
pub struct MediaTypeMatcher {
    accepts: Vec<AcceptEntry>,
    extension: Option<MediaType>,
}

impl MediaTypeMatcher {
    /// Parse an Accept header. An absent or blank header means
    /// `application/json`.
    pub fn parse(accept: Option<&str>, extension: Option<MediaType>) -> Result<Self, MediaTypeError> {
        let accept = accept.map(str::trim).filter(|a| !a.is_empty());
        let mut accepts = Vec::new();
        match accept {
            None => accepts.push(AcceptEntry {
                range: MediaType::json(),
                quality: 1.0,
            }),
            Some(header) => {
                for raw in header.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                    let range = MediaType::parse(raw)?;
                    let quality = match range.param("q") {
                        None => 1.0,
                        Some(q) => q
                            .parse::<f32>()
                            .ok()
                            .filter(|q| (0.0..=1.0).contains(q))
                            .ok_or_else(|| MediaTypeError::BadQuality(raw.to_string()))?,
                    };
                    accepts.push(AcceptEntry { range, quality });
                }
            }
        }
        // Stable: equal qualities keep header order.
        accepts.sort_by(|a, b| b.quality.total_cmp(&a.quality));
        Ok(Self { accepts, extension })
    }

    pub fn extension(&self) -> Option<&MediaType> {
        self.extension.as_ref()
    }

    /// Best candidate, or `None` when nothing acceptable is on offer.
    pub fn find_best_match(&self, candidates: &[MediaType]) -> Option<MediaType> {
        if let Some(ext) = &self.extension {
            if let Some(found) = candidates.iter().find(|c| *c == ext) {
                return Some(found.clone());
            }
        }
        self.accepts
            .iter()
            .filter(|entry| entry.quality > 0.0)
            .find_map(|entry| candidates.iter().find(|c| entry.range.includes(c)))
            .cloned()
    }
}

impl Default for MediaTypeMatcher {
    fn default() -> Self {
        Self {
            accepts: vec![AcceptEntry {
                range: MediaType::json(),
                quality: 1.0,
            }],
            extension: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> Vec<MediaType> {
        vec![MediaType::json(), MediaType::html()]
    }

    #[test]
    fn parses_parameters_and_ignores_them_for_equality() {
        let media = MediaType::parse("application/json; charset=UTF-8").unwrap();
        assert_eq!(media, MediaType::json());
        assert_eq!(media.param("charset"), Some("UTF-8"));
        assert!(MediaType::parse("json").is_err());
        assert!(MediaType::parse("*/json").is_err());
    }

    #[test]
    fn highest_quality_wins() {
        let matcher =
            MediaTypeMatcher::parse(Some("application/json;q=0.5, text/html"), None).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), Some(MediaType::html()));
    }

    #[test]
    fn ties_keep_header_order_and_wildcards_match() {
        let matcher = MediaTypeMatcher::parse(Some("text/*, application/*"), None).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), Some(MediaType::html()));

        let matcher = MediaTypeMatcher::parse(Some("*/*"), None).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), Some(MediaType::json()));
    }

    #[test]
    fn zero_quality_never_matches() {
        let matcher = MediaTypeMatcher::parse(Some("text/html;q=0"), None).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), None);
    }

    #[test]
    fn extension_beats_accept() {
        let matcher =
            MediaTypeMatcher::parse(Some("application/json"), Some(MediaType::html())).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), Some(MediaType::html()));
    }

    #[test]
    fn missing_accept_defaults_to_json() {
        let matcher = MediaTypeMatcher::parse(None, None).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), Some(MediaType::json()));
        let matcher = MediaTypeMatcher::parse(Some("application/xml"), None).unwrap();
        assert_eq!(matcher.find_best_match(&registered()), None);
    }
}
