//! Client-side tree cache for hierarchical, versioned coordination services.
//!
//! A [`TreeClient`] mirrors one or more subtrees of a ZooKeeper-like
//! namespace in memory. Each watched subtree is rooted at a [`TreeNode`]
//! whose event stream yields a [`NodeEvent`] whenever a node in the subtree
//! is first seen, changes, or goes away. Nodes stay current through
//! one-shot watches that are re-armed after every notification, backed by
//! a periodic flush that re-reads the whole subtree in case a notification
//! was lost.
//!
//! The coordination session itself is behind the [`Coordinator`] trait;
//! [`MemCoordinator`] is an in-process implementation.

mod client;
pub mod config;
mod coordination;
mod errors;
mod tree;
pub mod utils;

pub use client::*;
pub use config::*;
pub use coordination::*;
pub use errors::*;
pub use tree::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
