//! Status tray: the ordered status items of every application

use super::ShellError;
use crate::channel::{ProcessId, StatusHandle, StatusItemPayload};
use serde::Serialize;

/// One status item as the shell stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusItem {
    pub owner: ProcessId,
    pub handle: StatusHandle,
    pub payload: StatusItemPayload,
}

#[derive(Debug)]
struct TrayGroup {
    owner: ProcessId,
    items: Vec<StatusItem>,
}

/// Status items grouped by owner.
///
/// Groups appear in the order their owners attached; items inside a group
/// appear in the order they were first registered. Items are addressed by
/// (owner, handle) only, so one application can never reach another's items.
#[derive(Debug, Default)]
pub struct StatusTray {
    groups: Vec<TrayGroup>,
}

impl StatusTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an (empty) group for `owner` at the end of the tray
    pub fn attach(&mut self, owner: ProcessId) {
        if self.group(owner).is_none() {
            self.groups.push(TrayGroup {
                owner,
                items: Vec::new(),
            });
        }
    }

    fn group(&self, owner: ProcessId) -> Option<&TrayGroup> {
        self.groups.iter().find(|group| group.owner == owner)
    }

    fn group_mut(&mut self, owner: ProcessId) -> Option<&mut TrayGroup> {
        self.groups.iter_mut().find(|group| group.owner == owner)
    }

    /// Add or update an item.
    ///
    /// An existing handle keeps its position. A new handle is appended to the
    /// owner's group unless the group already holds `limit` items, in which
    /// case nothing changes. Returns true when a new item was added.
    pub fn register(
        &mut self,
        owner: ProcessId,
        handle: StatusHandle,
        payload: StatusItemPayload,
        limit: usize,
    ) -> Result<bool, ShellError> {
        self.attach(owner);
        let group = self
            .group_mut(owner)
            .ok_or(ShellError::UnknownSession(owner))?;

        if let Some(item) = group.items.iter_mut().find(|item| item.handle == handle) {
            item.payload = payload;
            return Ok(false);
        }

        if group.items.len() >= limit {
            return Err(ShellError::TooManyStatusItems { owner, limit });
        }

        group.items.push(StatusItem {
            owner,
            handle,
            payload,
        });
        Ok(true)
    }

    /// Remove one item; survivors keep their relative order
    pub fn unregister(&mut self, owner: ProcessId, handle: StatusHandle) -> bool {
        match self.group_mut(owner) {
            Some(group) => {
                let before = group.items.len();
                group.items.retain(|item| item.handle != handle);
                group.items.len() != before
            }
            None => false,
        }
    }

    /// Drop the owner's whole group in one step, returning how many items it held
    pub fn detach(&mut self, owner: ProcessId) -> usize {
        match self.groups.iter().position(|group| group.owner == owner) {
            Some(index) => self.groups.remove(index).items.len(),
            None => 0,
        }
    }

    pub fn get(&self, owner: ProcessId, handle: StatusHandle) -> Option<&StatusItem> {
        self.group(owner)?
            .items
            .iter()
            .find(|item| item.handle == handle)
    }

    /// The owner's items in registration order
    pub fn items_of(&self, owner: ProcessId) -> &[StatusItem] {
        self.group(owner)
            .map(|group| group.items.as_slice())
            .unwrap_or(&[])
    }

    /// Every item in render order
    pub fn items(&self) -> impl Iterator<Item = &StatusItem> + '_ {
        self.groups.iter().flat_map(|group| group.items.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
