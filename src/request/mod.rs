//! Request model: everything derived once from the transport request.
//!
//! # Data Flow
//! ```text
//! URI path ──▶ ResourcePath (+ extension stripped)
//! query    ──▶ ResourceParams ──▶ Pagination / Sorting / ReturnFields
//! Accept   ──▶ MediaTypeMatcher
//! headers  ──▶ RequestAttributes
//!                      │
//!                      ▼
//!               RequestContext (shared by every pipeline stage)
//! ```

pub mod context;
pub mod fields;
pub mod media;
pub mod params;

pub use context::{RequestAttributes, RequestContext, RequestContextBuilder, RequestType};
pub use fields::{ReturnFields, ReturnFieldsError};
pub use media::{MediaType, MediaTypeError, MediaTypeMatcher};
pub use params::{Pagination, ResourceParams, SortField, Sorting};
