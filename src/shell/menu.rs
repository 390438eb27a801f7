//! Per-application menu trees held by the shell

use crate::channel::{MenuNode, ProcessId};
use std::collections::HashMap;

/// Menu trees keyed by owning process.
///
/// Trees are only ever replaced whole; nothing edits a stored tree in place.
/// The order in which applications first attached is kept separately from
/// the trees so that replacing a tree never moves its owner.
#[derive(Debug, Default)]
pub struct MenuRegistry {
    menus: HashMap<ProcessId, MenuNode>,
    order: Vec<ProcessId>,
}

impl MenuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for `owner` in attach order
    pub fn attach(&mut self, owner: ProcessId) {
        if !self.order.contains(&owner) {
            self.order.push(owner);
        }
    }

    /// Store `tree` as the owner's menu, returning the tree it replaced
    pub fn replace(&mut self, owner: ProcessId, tree: MenuNode) -> Option<MenuNode> {
        self.attach(owner);
        self.menus.insert(owner, tree)
    }

    pub fn get(&self, owner: ProcessId) -> Option<&MenuNode> {
        self.menus.get(&owner)
    }

    /// Forget the owner's tree and its place in the order
    pub fn remove(&mut self, owner: ProcessId) -> Option<MenuNode> {
        self.order.retain(|pid| *pid != owner);
        self.menus.remove(&owner)
    }

    /// Registered trees in attach order
    pub fn iter(&self) -> impl Iterator<Item = (ProcessId, &MenuNode)> + '_ {
        self.order
            .iter()
            .filter_map(move |pid| self.menus.get(pid).map(|tree| (*pid, tree)))
    }

    pub fn len(&self) -> usize {
        self.menus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_only_latest_tree() {
        let mut registry = MenuRegistry::new();
        let app = ProcessId(10);

        let first = MenuNode::new("App").with_child(MenuNode::new("Old"));
        let second = MenuNode::new("App").with_child(MenuNode::new("New"));

        assert!(registry.replace(app, first.clone()).is_none());
        assert_eq!(registry.replace(app, second.clone()), Some(first));
        assert_eq!(registry.get(app), Some(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_follows_attach_order() {
        let mut registry = MenuRegistry::new();
        registry.attach(ProcessId(3));
        registry.attach(ProcessId(1));
        registry.replace(ProcessId(1), MenuNode::new("one"));
        registry.replace(ProcessId(3), MenuNode::new("three"));
        registry.replace(ProcessId(2), MenuNode::new("two"));

        let order: Vec<_> = registry.iter().map(|(pid, _)| pid.0).collect();
        assert_eq!(order, vec![3, 1, 2]);

        registry.remove(ProcessId(1));
        let order: Vec<_> = registry.iter().map(|(pid, _)| pid.0).collect();
        assert_eq!(order, vec![3, 2]);
        assert!(registry.get(ProcessId(1)).is_none());
    }
}
