//! Tray context menu model.

#[cfg(windows)]
use super::actions::{MenuActions, MenuOutcome};
#[cfg(windows)]
use super::host::ContextMenu;
#[cfg(windows)]
use super::shell::Hwnd;
#[cfg(windows)]
use crate::error::TrayError;

/// Something the user can pick from the tray menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    OpenConfigFile,
    ReloadConfig,
    CreateTemplate,
    About,
    Help,
    Exit,
}

impl MenuAction {
    pub fn label(self) -> &'static str {
        match self {
            MenuAction::OpenConfigFile => "Open Config File",
            MenuAction::ReloadConfig => "Reload Config",
            MenuAction::CreateTemplate => "Create Template Config",
            MenuAction::About => "About",
            MenuAction::Help => "Help",
            MenuAction::Exit => "Exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    Item(MenuAction),
    Separator,
}

/// Ordered menu entries. Ids are 1-based; 0 means nothing was selected.
#[derive(Debug, Clone, Default)]
pub struct MenuItemSet {
    entries: Vec<MenuEntry>,
}

impl MenuItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The menu shown on right-click.
    pub fn tray_default() -> Self {
        let mut items = Self::new();
        items.add_item(MenuAction::OpenConfigFile);
        items.add_item(MenuAction::ReloadConfig);
        items.add_item(MenuAction::CreateTemplate);
        items.add_separator();
        items.add_item(MenuAction::About);
        items.add_item(MenuAction::Help);
        items.add_separator();
        items.add_item(MenuAction::Exit);
        items
    }

    pub fn add_item(&mut self, action: MenuAction) {
        self.entries.push(MenuEntry::Item(action));
    }

    pub fn add_separator(&mut self) {
        self.entries.push(MenuEntry::Separator);
    }

    /// Entries paired with their command ids.
    pub fn entries(&self) -> impl Iterator<Item = (u32, MenuEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx as u32 + 1, *entry))
    }

    pub fn action_for(&self, id: u32) -> Option<MenuAction> {
        let idx = id.checked_sub(1)? as usize;
        match self.entries.get(idx)? {
            MenuEntry::Item(action) => Some(*action),
            MenuEntry::Separator => None,
        }
    }

    pub fn id_of(&self, action: MenuAction) -> Option<u32> {
        self.entries()
            .find(|(_, entry)| *entry == MenuEntry::Item(action))
            .map(|(id, _)| id)
    }
}

/// Native popup menu wired to the tray's right-click.
#[cfg(windows)]
pub struct TrayMenu {
    items: MenuItemSet,
    actions: MenuActions,
}

#[cfg(windows)]
impl TrayMenu {
    pub fn new(actions: MenuActions) -> Self {
        Self {
            items: MenuItemSet::tray_default(),
            actions,
        }
    }
}

#[cfg(windows)]
impl ContextMenu for TrayMenu {
    fn show_and_handle(&self, owner: Hwnd) -> Result<(), TrayError> {
        let selected = super::win32::track_popup_menu(owner, &self.items)?;
        let Some(action) = self.items.action_for(selected) else {
            tracing::debug!(selected, "Tray menu dismissed");
            return Ok(());
        };

        tracing::info!(action = ?action, "Tray menu item selected");
        if self.actions.handle(action) == MenuOutcome::Quit {
            super::win32::post_quit();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_one_based() {
        let items = MenuItemSet::tray_default();
        assert_eq!(items.action_for(0), None);
        assert_eq!(items.action_for(1), Some(MenuAction::OpenConfigFile));
        assert_eq!(items.id_of(MenuAction::Exit), Some(8));
        assert_eq!(items.action_for(9), None);
    }

    #[test]
    fn test_separators_are_not_actions() {
        let items = MenuItemSet::tray_default();
        assert_eq!(items.action_for(4), None);
        assert_eq!(items.action_for(7), None);

        let separators = items
            .entries()
            .filter(|(_, e)| *e == MenuEntry::Separator)
            .count();
        assert_eq!(separators, 2);
    }
}
