//! Product category forest.
//!
//! Categories reference an optional parent, forming a forest. The schema
//! only rejects direct self-reference; longer cycles are caught here, both
//! for validating a proposed re-parenting and for auditing a full snapshot
//! of the table.

use std::collections::{HashMap, HashSet};

use crate::CategoryId;

/// Errors describing a malformed category forest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryTreeError {
    /// A category or parent referenced an ID that is not in the forest.
    #[error("unknown category: {0}")]
    UnknownCategory(CategoryId),
    /// Following parent links from this category revisits it.
    #[error("category {0} is part of a parent cycle")]
    Cycle(CategoryId),
    /// A category names itself as its parent.
    #[error("category {0} cannot be its own parent")]
    SelfParent(CategoryId),
}

/// In-memory view of `product_categories` parent links.
#[derive(Debug, Clone, Default)]
pub struct CategoryForest {
    parents: HashMap<CategoryId, Option<CategoryId>>,
}

impl CategoryForest {
    /// Build from `(category, parent)` pairs.
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (CategoryId, Option<CategoryId>)>,
    {
        Self {
            parents: links.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: CategoryId) -> bool {
        self.parents.contains_key(&id)
    }

    /// Parent of `id`, or `None` for roots and unknown categories.
    #[must_use]
    pub fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        self.parents.get(&id).copied().flatten()
    }

    /// Categories without a parent, sorted for stable output.
    #[must_use]
    pub fn roots(&self) -> Vec<CategoryId> {
        let mut roots: Vec<_> = self
            .parents
            .iter()
            .filter(|(_, parent)| parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort();
        roots
    }

    /// Direct children of `id`, sorted for stable output.
    #[must_use]
    pub fn children(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut children: Vec<_> = self
            .parents
            .iter()
            .filter(|(_, parent)| **parent == Some(id))
            .map(|(child, _)| *child)
            .collect();
        children.sort();
        children
    }

    /// Ancestors of `id`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`CategoryTreeError::UnknownCategory`] if `id` or any parent on
    /// the path is missing, and [`CategoryTreeError::Cycle`] if the path loops.
    pub fn ancestors(&self, id: CategoryId) -> Result<Vec<CategoryId>, CategoryTreeError> {
        let mut current = *self
            .parents
            .get(&id)
            .ok_or(CategoryTreeError::UnknownCategory(id))?;
        let mut seen = HashSet::from([id]);
        let mut path = Vec::new();

        while let Some(parent) = current {
            if !seen.insert(parent) {
                return Err(CategoryTreeError::Cycle(parent));
            }
            path.push(parent);
            current = *self
                .parents
                .get(&parent)
                .ok_or(CategoryTreeError::UnknownCategory(parent))?;
        }

        Ok(path)
    }

    /// Depth of `id`: roots are 0.
    ///
    /// # Errors
    ///
    /// Same as [`CategoryForest::ancestors`].
    pub fn depth(&self, id: CategoryId) -> Result<usize, CategoryTreeError> {
        self.ancestors(id).map(|path| path.len())
    }

    /// Check that making `new_parent` the parent of `child` keeps the forest
    /// acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`CategoryTreeError::SelfParent`], [`CategoryTreeError::Cycle`]
    /// when `new_parent` is a descendant of `child`, or
    /// [`CategoryTreeError::UnknownCategory`] for missing IDs.
    pub fn check_reparent(
        &self,
        child: CategoryId,
        new_parent: Option<CategoryId>,
    ) -> Result<(), CategoryTreeError> {
        if !self.contains(child) {
            return Err(CategoryTreeError::UnknownCategory(child));
        }
        let Some(parent) = new_parent else {
            return Ok(());
        };
        if parent == child {
            return Err(CategoryTreeError::SelfParent(child));
        }
        if !self.contains(parent) {
            return Err(CategoryTreeError::UnknownCategory(parent));
        }
        if self.ancestors(parent)?.contains(&child) {
            return Err(CategoryTreeError::Cycle(child));
        }
        Ok(())
    }

    /// Apply a re-parenting after checking it.
    ///
    /// # Errors
    ///
    /// Same as [`CategoryForest::check_reparent`].
    pub fn reparent(
        &mut self,
        child: CategoryId,
        new_parent: Option<CategoryId>,
    ) -> Result<(), CategoryTreeError> {
        self.check_reparent(child, new_parent)?;
        self.parents.insert(child, new_parent);
        Ok(())
    }

    /// Audit the whole forest, returning every problem found.
    ///
    /// Each cycle is reported once, by its smallest member.
    #[must_use]
    pub fn problems(&self) -> Vec<CategoryTreeError> {
        let mut problems = Vec::new();
        let mut reported_cycles = HashSet::new();

        let mut ids: Vec<_> = self.parents.keys().copied().collect();
        ids.sort();

        for id in ids {
            if self.parents.get(&id) == Some(&Some(id)) {
                problems.push(CategoryTreeError::SelfParent(id));
                continue;
            }
            match self.ancestors(id) {
                Ok(_) => {}
                Err(CategoryTreeError::Cycle(_)) => {
                    let first = self.cycle_members(id).into_iter().min();
                    if let Some(first) = first.filter(|first| reported_cycles.insert(*first)) {
                        problems.push(CategoryTreeError::Cycle(first));
                    }
                }
                Err(err @ CategoryTreeError::UnknownCategory(_)) => {
                    if !problems.contains(&err) {
                        problems.push(err);
                    }
                }
                Err(CategoryTreeError::SelfParent(_)) => {}
            }
        }

        problems
    }

    /// Members of the cycle reachable from `start`.
    fn cycle_members(&self, start: CategoryId) -> Vec<CategoryId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(start);

        while let Some(id) = current {
            if !seen.insert(id) {
                let pos = order.iter().position(|x| *x == id).unwrap_or(0);
                return order.split_off(pos);
            }
            order.push(id);
            current = self.parent(id);
        }

        Vec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ids<const N: usize>() -> [CategoryId; N] {
        let mut ids = [CategoryId::generate(); N];
        for id in &mut ids {
            *id = CategoryId::generate();
        }
        ids.sort();
        ids
    }

    #[test]
    fn test_depth_and_ancestors() {
        let [electronics, phones, cases] = ids();
        let forest = CategoryForest::from_links([
            (electronics, None),
            (phones, Some(electronics)),
            (cases, Some(phones)),
        ]);

        assert_eq!(forest.depth(electronics).unwrap(), 0);
        assert_eq!(forest.depth(cases).unwrap(), 2);
        assert_eq!(forest.ancestors(cases).unwrap(), vec![phones, electronics]);
        assert_eq!(forest.roots(), vec![electronics]);
        assert_eq!(forest.children(electronics), vec![phones]);
    }

    #[test]
    fn test_reparent_under_descendant_is_rejected() {
        let [root, mid, leaf] = ids();
        let mut forest =
            CategoryForest::from_links([(root, None), (mid, Some(root)), (leaf, Some(mid))]);

        assert_eq!(
            forest.reparent(root, Some(leaf)),
            Err(CategoryTreeError::Cycle(root))
        );
        assert_eq!(
            forest.reparent(mid, Some(mid)),
            Err(CategoryTreeError::SelfParent(mid))
        );
        // Forest is unchanged after rejected moves.
        assert_eq!(forest.parent(root), None);
    }

    #[test]
    fn test_reparent_sideways_is_allowed() {
        let [a, b, c] = ids();
        let mut forest = CategoryForest::from_links([(a, None), (b, None), (c, Some(a))]);

        forest.reparent(c, Some(b)).unwrap();
        assert_eq!(forest.parent(c), Some(b));
        forest.reparent(c, None).unwrap();
        assert_eq!(forest.depth(c).unwrap(), 0);
    }

    #[test]
    fn test_unknown_parent() {
        let [a, ghost] = ids();
        let forest = CategoryForest::from_links([(a, None)]);
        assert_eq!(
            forest.check_reparent(a, Some(ghost)),
            Err(CategoryTreeError::UnknownCategory(ghost))
        );
    }

    #[test]
    fn test_problems_reports_each_cycle_once() {
        let [a, b, c, d, e] = ids();
        // a -> b -> c -> a is a cycle; d hangs off it; e is a healthy root.
        let forest = CategoryForest::from_links([
            (a, Some(b)),
            (b, Some(c)),
            (c, Some(a)),
            (d, Some(a)),
            (e, None),
        ]);

        let problems = forest.problems();
        assert_eq!(problems, vec![CategoryTreeError::Cycle(a)]);
        assert!(forest.depth(e).is_ok());
    }

    #[test]
    fn test_problems_reports_dangling_parent() {
        let [a, ghost] = ids();
        let forest = CategoryForest::from_links([(a, Some(ghost))]);
        assert_eq!(
            forest.problems(),
            vec![CategoryTreeError::UnknownCategory(ghost)]
        );
    }

    #[test]
    fn test_healthy_forest_has_no_problems() {
        let [a, b, c] = ids();
        let forest = CategoryForest::from_links([(a, None), (b, Some(a)), (c, None)]);
        assert!(forest.problems().is_empty());
    }
}
