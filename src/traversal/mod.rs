//! Path resolution and operation application.
//!
//! # Data Flow
//! ```text
//! RequestContext (type, path)
//!        │
//!        ▼
//! TraversalPlan: Read(seg1) ─▶ Read(seg2) ─▶ … ─▶ Create | Update | Delete
//!        │
//!        ▼
//! TraversalEngine ──readMember / createMember / …──▶ Dispatcher
//!        │
//!        ▼
//! ResourceOutcome ──▶ pipeline
//! ```
//!
//! # Design Decisions
//! - The plan is an explicit step list with a cursor instead of a chain of
//!   linked step objects, so rewriting a step is a list edit.
//! - A missing update target is created rather than reported (`PUT`
//!   creates if absent). The request state is relabelled with the missing id.
//! - A miss anywhere else carries only the failing segment's name.

pub mod engine;
pub mod plan;

pub use engine::TraversalEngine;
pub use plan::{Step, TraversalPlan};
