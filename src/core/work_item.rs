//! Work items - one cell of the build matrix.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::flavor::BuildFlavor;
use crate::core::source_tree::SourceTree;

/// A (source tree, flavor) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkItem {
    pub source: SourceTree,
    #[serde(serialize_with = "serialize_flavor_name")]
    pub flavor: BuildFlavor,
}

impl WorkItem {
    /// Create a work item.
    pub fn new(source: SourceTree, flavor: BuildFlavor) -> Self {
        WorkItem { source, flavor }
    }

    /// Build the deduplicated cross product of sources and flavors.
    pub fn matrix<'a>(
        sources: impl IntoIterator<Item = &'a SourceTree>,
        flavors: &[BuildFlavor],
    ) -> BTreeSet<WorkItem> {
        let mut items = BTreeSet::new();
        for source in sources {
            for flavor in flavors {
                items.insert(WorkItem::new(source.clone(), flavor.clone()));
            }
        }
        items
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.source, self.flavor)
    }
}

fn serialize_flavor_name<S: serde::Serializer>(
    flavor: &BuildFlavor,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&flavor.name)
}
