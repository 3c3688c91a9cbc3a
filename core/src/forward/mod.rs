//! The forward file: parsing into structured state and rendering back.
//!
//! Parsing is lenient. Tokens that are not understood are classified and
//! then ignored, and the file is always regenerated from scratch by
//! [`crate::reconcile`] rather than patched in place.

pub mod directive;
mod model;

pub use directive::{Classifier, Directive};
pub use model::{ForwardState, KeepType};
