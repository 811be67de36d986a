//! Resource paths.
//!
//! A path is an ordered list of segments, each a name plus optional matrix
//! parameters: `/app/items;version=2/abc` has segments `app`, `items`
//! (with `version=2`) and `abc`. Paths are immutable once parsed.

use std::fmt;

/// A single path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    name: String,
    matrix: Vec<(String, String)>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matrix: Vec::new(),
        }
    }

    fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let name = parts.next().unwrap_or_default().to_string();
        let matrix = parts
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (p.to_string(), String::new()),
            })
            .collect();
        Self { name, matrix }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First value of a matrix parameter.
    pub fn matrix_param(&self, key: &str) -> Option<&str> {
        self.matrix
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn matrix_params(&self) -> &[(String, String)] {
        &self.matrix
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (k, v) in &self.matrix {
            if v.is_empty() {
                write!(f, ";{}", k)?;
            } else {
                write!(f, ";{}={}", k, v)?;
            }
        }
        Ok(())
    }
}

/// Parsed, immutable resource path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourcePath {
    segments: Vec<Segment>,
}

impl ResourcePath {
    /// Parse a raw URI path. Empty segments (`//`, trailing `/`) are dropped.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect();
        Self { segments }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn tail(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The path without its last segment. The parent of the root is the root.
    pub fn parent(&self) -> ResourcePath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// A new path with `name` appended.
    pub fn child(&self, name: impl Into<String>) -> ResourcePath {
        let mut segments = self.segments.clone();
        segments.push(Segment::new(name));
        Self { segments }
    }

    /// Split a trailing `.ext` off the last segment when `accept(ext)` says
    /// the extension is meaningful. Returns the stripped path and the extension.
    pub fn strip_extension<F>(mut self, accept: F) -> (ResourcePath, Option<String>)
    where
        F: Fn(&str) -> bool,
    {
        let Some(last) = self.segments.last_mut() else {
            return (self, None);
        };
        let Some(dot) = last.name.rfind('.') else {
            return (self, None);
        };
        if dot == 0 {
            return (self, None);
        }
        let ext = last.name[dot + 1..].to_string();
        if !accept(&ext) {
            return (self, None);
        }
        last.name.truncate(dot);
        (self, Some(ext))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments_and_matrix_params() {
        let path = ResourcePath::parse("/app/items;version=2;draft/abc/");
        let names: Vec<_> = path.segments().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["app", "items", "abc"]);
        assert_eq!(path.segments()[1].matrix_param("version"), Some("2"));
        assert_eq!(path.segments()[1].matrix_param("draft"), Some(""));
        assert_eq!(path.to_string(), "/app/items;version=2;draft/abc");
    }

    #[test]
    fn root_and_parent() {
        let root = ResourcePath::parse("/");
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert_eq!(ResourcePath::parse("/a/b").parent().to_string(), "/a");
        assert!(root.parent().is_root());
    }

    #[test]
    fn strips_only_known_extensions() {
        let known = |ext: &str| ext == "json";
        let (path, ext) = ResourcePath::parse("/coll/item.json").strip_extension(known);
        assert_eq!(path.to_string(), "/coll/item");
        assert_eq!(ext.as_deref(), Some("json"));

        let (path, ext) = ResourcePath::parse("/files/report.pdf").strip_extension(known);
        assert_eq!(path.to_string(), "/files/report.pdf");
        assert!(ext.is_none());
    }
}
