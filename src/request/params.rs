//! Query parameters, pagination and sorting.

use std::cmp::Ordering;

/// Multi-valued query parameters in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceParams {
    pairs: Vec<(String, String)>,
}

impl ResourceParams {
    /// Decode a raw (percent-encoded) query string.
    pub fn parse(query: Option<&str>) -> Self {
        let pairs = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// First value for `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn values(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !names.contains(&k.as_str()) {
                names.push(k);
            }
        }
        names
    }

    /// The opaque `q` query, handed through to resources uninterpreted.
    pub fn query(&self) -> Option<&str> {
        self.value("q")
    }
}

/// Window over a collection's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    offset: usize,
    limit: usize,
}

impl Pagination {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    /// Clamp `limit` into `[0, MAX_LIMIT]`.
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }

    /// Read `offset` and `limit`. Missing or non-numeric values take the
    /// defaults; negative values clamp to zero.
    pub fn from_params(params: &ResourceParams) -> Self {
        let offset = int_value(params.value("offset"), 0);
        let limit = int_value(params.value("limit"), Self::DEFAULT_LIMIT as i64);
        Self::new(offset.max(0) as usize, limit.max(0) as usize)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Index range of the page within a collection of `total` members.
    pub fn window(&self, total: usize) -> std::ops::Range<usize> {
        let start = self.offset.min(total);
        let end = self.offset.saturating_add(self.limit).min(total);
        start..end
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

fn int_value(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub ascending: bool,
}

/// Ordered sort keys from `sort=a,-b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sorting {
    fields: Vec<SortField>,
}

impl Sorting {
    pub fn parse(spec: &str) -> Self {
        let fields = spec
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty() && *f != "-")
            .map(|f| match f.strip_prefix('-') {
                Some(name) => SortField {
                    name: name.to_string(),
                    ascending: false,
                },
                None => SortField {
                    name: f.to_string(),
                    ascending: true,
                },
            })
            .collect();
        Self { fields }
    }

    pub fn from_params(params: &ResourceParams) -> Self {
        params.value("sort").map(Self::parse).unwrap_or_default()
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compare two items key by key. `key` extracts a comparable value for a
    /// field name; missing keys sort first.
    pub fn compare<T, K, F>(&self, a: &T, b: &T, key: F) -> Ordering
    where
        K: Ord,
        F: Fn(&T, &str) -> Option<K>,
    {
        for field in &self.fields {
            let ord = key(a, &field.name).cmp(&key(b, &field.name));
            let ord = if field.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_valued_and_encoded_params() {
        let params = ResourceParams::parse(Some("tag=a&tag=b&q=%7B%22x%22%3A1%7D"));
        assert_eq!(params.values("tag"), vec!["a", "b"]);
        assert_eq!(params.query(), Some("{\"x\":1}"));
        assert_eq!(params.names(), vec!["tag", "q"]);
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        let p = Pagination::from_params(&ResourceParams::parse(None));
        assert_eq!((p.offset(), p.limit()), (0, Pagination::DEFAULT_LIMIT));

        let p = Pagination::from_params(&ResourceParams::parse(Some("offset=-4&limit=5000")));
        assert_eq!((p.offset(), p.limit()), (0, Pagination::MAX_LIMIT));

        let p = Pagination::from_params(&ResourceParams::parse(Some("limit=abc")));
        assert_eq!(p.limit(), Pagination::DEFAULT_LIMIT);
    }

    #[test]
    fn window_handles_edges() {
        assert_eq!(Pagination::new(1, 2).window(5), 1..3);
        assert_eq!(Pagination::new(4, 10).window(5), 4..5);
        assert_eq!(Pagination::new(9, 2).window(5), 5..5);
        assert_eq!(Pagination::new(0, 0).window(5), 0..0);
    }

    #[test]
    fn sorting_respects_direction() {
        let sorting = Sorting::parse("group,-name");
        let mut items = vec![(1, "a"), (2, "b"), (1, "c")];
        items.sort_by(|a, b| {
            sorting.compare(a, b, |item, field| match field {
                "group" => Some(item.0.to_string()),
                "name" => Some(item.1.to_string()),
                _ => None,
            })
        });
        assert_eq!(items, vec![(1, "c"), (1, "a"), (2, "b")]);
    }
}
