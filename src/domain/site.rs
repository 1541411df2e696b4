use serde::{Deserialize, Serialize};

use super::Component;
use crate::error::{SimError, SimResult};

/// A group of identical components on a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentGroup {
    /// Category name, e.g. "Fugitive"
    pub category: String,
    /// Number of components of this category on each site
    pub count: usize,
    pub component: Component,
}

/// A facility type and the equipment installed on each instance of it.
///
/// Component indices on a site are laid out group by group in declaration
/// order: the first group occupies `0..count_0`, the next follows, and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    components: Vec<ComponentGroup>,
    /// comp_index -> index into `components`
    comp_lookup: Vec<usize>,
    /// First comp_index of each group
    group_offsets: Vec<usize>,
}

impl Site {
    pub fn new(name: impl Into<String>, components: Vec<ComponentGroup>) -> SimResult<Self> {
        let name = name.into();
        let mut comp_lookup = Vec::new();
        let mut group_offsets = Vec::with_capacity(components.len());

        for (group_index, group) in components.iter().enumerate() {
            if components[..group_index]
                .iter()
                .any(|other| other.category == group.category)
            {
                return Err(SimError::config(format!(
                    "site '{}' declares component category '{}' twice",
                    name, group.category
                )));
            }
            group.component.validate()?;
            group_offsets.push(comp_lookup.len());
            comp_lookup.extend(std::iter::repeat(group_index).take(group.count));
        }

        Ok(Self {
            name,
            components,
            comp_lookup,
            group_offsets,
        })
    }

    pub fn components(&self) -> &[ComponentGroup] {
        &self.components
    }

    /// Total number of components on one site of this type
    pub fn total_components(&self) -> usize {
        self.comp_lookup.len()
    }

    /// Component group owning `comp_index`
    pub fn component_at(&self, comp_index: usize) -> Option<&ComponentGroup> {
        self.comp_lookup
            .get(comp_index)
            .map(|&group| &self.components[group])
    }

    /// Range of component indices belonging to group `group_index`
    pub fn group_range(&self, group_index: usize) -> std::ops::Range<usize> {
        let start = self.group_offsets[group_index];
        start..start + self.components[group_index].count
    }
}
