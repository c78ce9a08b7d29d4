//! Small shared helpers used across more than one component.

pub mod duration_serde;
