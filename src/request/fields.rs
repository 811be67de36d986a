//! Return-field projections (`fields=` and `expand=`).
//!
//! Grammar: a comma-separated list of `*`, `name`, `-name`, `name(nested)`
//! or `*(nested)`. A field with a nested projection is expanded in the
//! response; one without is rendered as a link. A list made only of
//! exclusions means `*` minus those fields. Nesting is limited to
//! [`MAX_DEPTH`] levels.

/// Deepest accepted `name(...)` nesting.
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReturnFieldsError {
    #[error("unbalanced parentheses in {0:?}")]
    Unbalanced(String),

    #[error("empty field name in {0:?}")]
    EmptyName(String),

    #[error("field projection nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnFields {
    all: bool,
    all_nested: Option<Box<ReturnFields>>,
    included: Vec<(String, Option<ReturnFields>)>,
    excluded: Vec<String>,
}

impl ReturnFields {
    /// Projection equivalent to `*`.
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn parse(spec: &str) -> Result<Self, ReturnFieldsError> {
        if nesting_depth(spec) > MAX_DEPTH {
            return Err(ReturnFieldsError::TooDeep { limit: MAX_DEPTH });
        }
        Self::parse_nested(spec)
    }

    fn parse_nested(spec: &str) -> Result<Self, ReturnFieldsError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self::all());
        }
        let mut fields = Self::default();
        for item in split_top_level(spec)? {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if let Some(name) = item.strip_prefix('-') {
                if name.is_empty() {
                    return Err(ReturnFieldsError::EmptyName(spec.to_string()));
                }
                fields.excluded.push(name.to_string());
                continue;
            }
            let (name, nested) = match item.find('(') {
                Some(open) => {
                    if !item.ends_with(')') {
                        return Err(ReturnFieldsError::Unbalanced(spec.to_string()));
                    }
                    let inner = &item[open + 1..item.len() - 1];
                    (item[..open].trim(), Some(Self::parse_nested(inner)?))
                }
                None => (item, None),
            };
            if name.is_empty() {
                return Err(ReturnFieldsError::EmptyName(spec.to_string()));
            }
            if name == "*" {
                fields.all = true;
                fields.all_nested = nested.map(Box::new);
            } else {
                fields.included.push((name.to_string(), nested));
            }
        }
        if !fields.all && fields.included.is_empty() && !fields.excluded.is_empty() {
            fields.all = true;
        }
        Ok(fields)
    }

    /// Merge an `expand=` list: each named field (or `*`) gains a nested `*`
    /// projection unless it already has one.
    pub fn expand(mut self, spec: &str) -> Result<Self, ReturnFieldsError> {
        for name in split_top_level(spec)?.into_iter().map(str::trim) {
            if name.is_empty() {
                continue;
            }
            if name == "*" {
                self.all = true;
                if self.all_nested.is_none() {
                    self.all_nested = Some(Box::new(Self::all()));
                }
                continue;
            }
            match self.included.iter_mut().find(|(n, _)| n == name) {
                Some((_, nested @ None)) => *nested = Some(Self::all()),
                Some(_) => {}
                None => self.included.push((name.to_string(), Some(Self::all()))),
            }
        }
        Ok(self)
    }

    pub fn is_all(&self) -> bool {
        self.all && self.excluded.is_empty()
    }

    /// Whether `name` appears in the output at all.
    pub fn included(&self, name: &str) -> bool {
        if self.excluded.iter().any(|n| n == name) {
            return false;
        }
        self.all || self.included.iter().any(|(n, _)| n == name)
    }

    /// Nested projection for `name`, present only when the field should be
    /// expanded.
    pub fn child(&self, name: &str) -> Option<&ReturnFields> {
        if !self.included(name) {
            return None;
        }
        match self.included.iter().find(|(n, _)| n == name) {
            Some((_, Some(nested))) => Some(nested),
            Some((_, None)) => None,
            None => self.all_nested.as_deref(),
        }
    }
}

/// Deepest parenthesis nesting in `spec`, counting unmatched opens.
fn nesting_depth(spec: &str) -> usize {
    let (mut depth, mut max) = (0usize, 0usize);
    for c in spec.chars() {
        match c {
            '(' => {
                depth += 1;
                max = max.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

fn split_top_level(spec: &str) -> Result<Vec<&str>, ReturnFieldsError> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in spec.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ReturnFieldsError::Unbalanced(spec.to_string()))?
            }
            ',' if depth == 0 => {
                items.push(&spec[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ReturnFieldsError::Unbalanced(spec.to_string()));
    }
    items.push(&spec[start..]);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_includes_everything_without_expanding() {
        let fields = ReturnFields::parse("*").unwrap();
        assert!(fields.included("name"));
        assert!(fields.child("members").is_none());
    }

    #[test]
    fn named_and_excluded_fields() {
        let fields = ReturnFields::parse("*,-secret").unwrap();
        assert!(fields.included("name"));
        assert!(!fields.included("secret"));

        let fields = ReturnFields::parse("name,age").unwrap();
        assert!(fields.included("age"));
        assert!(!fields.included("other"));
    }

    #[test]
    fn nested_projections() {
        let fields = ReturnFields::parse("name,owner(name,email(*)),members(*)").unwrap();
        let owner = fields.child("owner").unwrap();
        assert!(owner.included("email"));
        assert!(!owner.included("phone"));
        assert!(owner.child("email").unwrap().is_all());
        assert!(fields.child("members").unwrap().is_all());
        assert!(fields.child("name").is_none());
    }

    #[test]
    fn expand_adds_nested_star() {
        let fields = ReturnFields::parse("*").unwrap().expand("members").unwrap();
        assert!(fields.child("members").unwrap().is_all());
        assert!(fields.included("other"));

        let fields = ReturnFields::parse("*").unwrap().expand("*").unwrap();
        assert!(fields.child("anything").is_some());
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(ReturnFields::parse("a(b").is_err());
        assert!(ReturnFields::parse("a)b").is_err());
        assert!(ReturnFields::parse("a,-").is_err());
    }

    #[test]
    fn rejects_deep_nesting_without_recursing() {
        let nested = |levels: usize| format!("{}{}", "a(".repeat(levels), ")".repeat(levels));
        assert!(ReturnFields::parse(&nested(MAX_DEPTH)).is_ok());
        assert_eq!(
            ReturnFields::parse(&nested(MAX_DEPTH + 1)),
            Err(ReturnFieldsError::TooDeep { limit: MAX_DEPTH })
        );

        // Far deeper than any thread stack could recurse through.
        let hostile = format!("{}{}", "a(".repeat(200_000), ")".repeat(200_000));
        let err = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || ReturnFields::parse(&hostile))
            .unwrap()
            .join()
            .unwrap()
            .unwrap_err();
        assert_eq!(err, ReturnFieldsError::TooDeep { limit: MAX_DEPTH });
    }

    #[test]
    fn exclusions_alone_mean_everything_else() {
        let fields = ReturnFields::parse("-secret").unwrap();
        assert!(fields.included("name"));
        assert!(fields.included("members"));
        assert!(!fields.included("secret"));
        assert!(!fields.is_all());
    }
}
