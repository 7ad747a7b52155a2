use bytes::Bytes;

use crate::Stat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEventKind {
    /// First observation of a node (its initial read)
    Created,
    /// Accepted data or children version change
    Updated,
    /// The node left the cache
    Removed,
}

/// An immutable change record delivered on a subtree root's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub path: String,
    pub name: String,
    /// Empty for removals and children-only changes
    pub data: Bytes,
    /// Metadata of the read that produced the event; `None` for removals
    pub stat: Option<Stat>,
    pub kind: NodeEventKind,
}

impl NodeEvent {
    pub(crate) fn with_data(
        kind: NodeEventKind,
        path: &str,
        name: &str,
        data: Bytes,
        stat: Stat,
    ) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            data,
            stat: Some(stat),
            kind,
        }
    }

    pub(crate) fn removed(
        path: &str,
        name: &str,
    ) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            data: Bytes::new(),
            stat: None,
            kind: NodeEventKind::Removed,
        }
    }

    /// Data version of the read behind this event, if any
    pub fn version(&self) -> Option<i32> {
        self.stat.map(|s| s.version)
    }
}
