//! Which menu is open, and the one listener that closes it.

use std::cell::Cell;
use std::rc::Rc;

use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveMenu {
    #[default]
    None,
    Dropdown(SmolStr),
    Container(SmolStr),
}

impl ActiveMenu {
    pub fn is_open(&self) -> bool {
        !matches!(self, ActiveMenu::None)
    }
}

/// Subscription to outside clicks. Unsubscribes when dropped.
#[derive(Debug)]
pub struct ListenerHandle {
    live: Rc<Cell<usize>>,
}

impl ListenerHandle {
    fn subscribe(live: &Rc<Cell<usize>>) -> Self {
        live.set(live.get() + 1);
        Self { live: live.clone() }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

#[derive(Debug, Default)]
pub struct MenuState {
    active: ActiveMenu,
    outside_click: Option<ListenerHandle>,
    live_listeners: Rc<Cell<usize>>,
}

impl MenuState {
    pub fn active(&self) -> &ActiveMenu {
        &self.active
    }

    /// Switch menus. The previous menu and its outside-click listener are torn down
    /// before the next one is installed, so at most one listener is ever live.
    pub fn set(&mut self, next: ActiveMenu) {
        self.teardown();
        if next.is_open() {
            self.outside_click = Some(ListenerHandle::subscribe(&self.live_listeners));
        }
        tracing::trace!(target: "verso::menu", menu = ?next, "menu state changed");
        self.active = next;
    }

    pub fn close(&mut self) {
        self.set(ActiveMenu::None);
    }

    /// A click landed outside the open menu.
    pub fn outside_click(&mut self) -> bool {
        if self.outside_click.is_none() {
            return false;
        }
        self.close();
        true
    }

    /// Number of outside-click subscriptions currently alive.
    pub fn live_listeners(&self) -> usize {
        self.live_listeners.get()
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.outside_click.take() {
            drop(handle);
        }
        self.active = ActiveMenu::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_keeps_a_single_listener() {
        let mut menu = MenuState::default();
        for _ in 0..5 {
            menu.set(ActiveMenu::Dropdown("font".into()));
            menu.set(ActiveMenu::Container("table".into()));
        }
        assert_eq!(menu.live_listeners(), 1);
        assert_eq!(menu.active(), &ActiveMenu::Container("table".into()));
    }

    #[test]
    fn outside_click_closes() {
        let mut menu = MenuState::default();
        assert!(!menu.outside_click());
        menu.set(ActiveMenu::Dropdown("align".into()));
        assert!(menu.outside_click());
        assert_eq!(menu.active(), &ActiveMenu::None);
        assert_eq!(menu.live_listeners(), 0);
    }
}
