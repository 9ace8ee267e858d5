//! These models represent the objects passed between the engines, the tools and the provider
//!
//! Messages keep the shape the rest of the platform persists: camelCase keys, optional
//! tool calls on assistant messages, and tool results carrying their artifacts and error.
//! Extension fields that this crate does not know about are preserved as-is.
pub mod artifact;
pub mod message;
pub mod tool;
