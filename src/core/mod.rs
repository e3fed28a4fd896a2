//! Core data structures for buildmatrix.
//!
//! This module contains the foundational types of a build matrix:
//! - Source trees (checkouts) and build flavors
//! - Components and their pipeline declarations
//! - Work items (one matrix cell each)

pub mod component;
pub mod flavor;
pub mod source_tree;
pub mod work_item;

pub use component::{builtin_components, Component, ConfigureStep, ToolEnv};
pub use flavor::{BuildFlavor, BUILTIN_FLAVORS};
pub use source_tree::SourceTree;
pub use work_item::WorkItem;
