//! Obstruction Rules - Trait Names That Must Not Co-occur

use std::collections::{BTreeSet, HashSet};
use tracing::warn;

use crate::catalog::LayerCatalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstructionGroup {
    names: BTreeSet<String>,
    /// Groups naming an element absent from the catalog can never complete.
    active: bool,
}

impl ObstructionGroup {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            active: true,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True when adding `candidate` to `selected` would contain every name of the group.
    pub fn completed_by(&self, selected: &HashSet<&str>, candidate: &str) -> bool {
        self.active
            && self.names.contains(candidate)
            && self
                .names
                .iter()
                .all(|n| n == candidate || selected.contains(n.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObstructionRules {
    groups: Vec<ObstructionGroup>,
}

impl ObstructionRules {
    pub fn new(groups: Vec<ObstructionGroup>) -> Self {
        Self { groups }
    }

    pub fn from_names(groups: &[Vec<String>]) -> Self {
        Self::new(groups.iter().map(|g| ObstructionGroup::new(g.iter().cloned())).collect())
    }

    /// Deactivate groups that reference names the catalog does not contain.
    pub fn resolve(mut self, catalog: &LayerCatalog) -> Self {
        let known = catalog.element_names();
        for group in &mut self.groups {
            let unknown: Vec<&str> = group.names().filter(|n| !known.contains(n)).collect();
            if !unknown.is_empty() {
                warn!(?unknown, "Obstruction group references unknown elements, it will never trigger");
                group.active = false;
            }
        }
        self
    }

    pub fn groups(&self) -> &[ObstructionGroup] {
        &self.groups
    }

    pub fn blocks(&self, selected: &HashSet<&str>, candidate: &str) -> bool {
        self.groups.iter().any(|g| g.completed_by(selected, candidate))
    }

    /// Check a finished name set against every active group.
    pub fn violated_by(&self, names: &HashSet<&str>) -> Option<&ObstructionGroup> {
        self.groups
            .iter()
            .find(|g| g.active && g.names.iter().all(|n| names.contains(n.as_str())))
    }
}
