//! Description of one rendered bar frame

use crate::channel::{IconRef, MenuNode, ProcessId, StatusHandle};
use super::tray::StatusItem;
use serde::Serialize;

/// Everything a presenter needs to draw the bar, and nothing more
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDescription {
    /// Menu of the active application, if any
    pub app_menu: Option<AppMenuFrame>,
    pub clock: String,
    /// Status icons in display order
    pub tray: Vec<TrayIconFrame>,
}

/// The active application's menu as shown in the bar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppMenuFrame {
    pub owner: ProcessId,
    /// Root title of the tree, shown in bold before the menu titles
    pub app_name: String,
    pub titles: Vec<MenuTitle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuTitle {
    pub title: String,
    pub enabled: bool,
    pub has_submenu: bool,
}

/// One tray icon. Clicking it targets (owner, handle).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrayIconFrame {
    pub owner: ProcessId,
    pub handle: StatusHandle,
    pub icon: IconRef,
    pub title: String,
}

impl AppMenuFrame {
    pub fn from_tree(owner: ProcessId, tree: &MenuNode) -> Self {
        Self {
            owner,
            app_name: tree.title.clone(),
            titles: tree
                .children
                .iter()
                .map(|node| MenuTitle {
                    title: node.title.clone(),
                    enabled: node.enabled,
                    has_submenu: !node.children.is_empty(),
                })
                .collect(),
        }
    }
}

impl From<&StatusItem> for TrayIconFrame {
    fn from(item: &StatusItem) -> Self {
        Self {
            owner: item.owner,
            handle: item.handle,
            icon: item.payload.icon.clone(),
            title: item.payload.title.clone(),
        }
    }
}

impl FrameDescription {
    /// Whether anything in the frame belongs to `pid`
    pub fn mentions(&self, pid: ProcessId) -> bool {
        self.app_menu.as_ref().map(|menu| menu.owner) == Some(pid)
            || self.tray.iter().any(|icon| icon.owner == pid)
    }

    /// Tray as (owner, handle) pairs, handy for ordering checks
    pub fn tray_keys(&self) -> Vec<(ProcessId, StatusHandle)> {
        self.tray.iter().map(|icon| (icon.owner, icon.handle)).collect()
    }
}
