//! Response state assembly.
//!
//! # Data Flow
//! ```text
//! ResourceResponse (resource)
//!        │
//!        ▼
//! EncodingDriver::encode ──readProperties──▶ filter by ReturnFields
//!        │                                        │
//!        │                      Value::Resource ──┴─▶ expand (nested fields) or link
//!        │
//!        └──readMembers──▶ "members": expand or link, in resource order
//!        │
//!        ▼
//! ResourceState ──▶ codec manager
//! ```
//!
//! # Design Decisions
//! - The walk is a boxed recursive future; every read goes through the
//!   dispatcher so blocking resources are read on a worker.
//! - Any walk failure is reported as `NotAcceptable`.

pub mod driver;

pub use driver::{EncodingDriver, MEMBERS_FIELD};
