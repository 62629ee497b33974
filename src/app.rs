use anyhow::Result;
use crossterm::event::KeyEvent;
use tracing::debug;

use crate::detail::ProductInfo;
use crate::focus::{FocusRing, Focusable};
use crate::input::{self, Action};
use crate::model::{PanelId, ResourceKind};
use crate::repository::Repositories;
use crate::tree::{ProductTree, TreeActivation};

const PAGE_STEP: isize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    ToggleCategory(ResourceKind),
    ShowResource {
        kind: ResourceKind,
        identifier: String,
    },
}

pub struct App {
    running: bool,
    account: String,
    test_mode: bool,
    status: String,
    tree: ProductTree,
    info: ProductInfo,
    focus: FocusRing,
}

impl App {
    pub fn new(repos: Repositories, account: String, test_mode: bool) -> Self {
        Self {
            running: true,
            account,
            test_mode,
            status: "Ready".to_string(),
            info: ProductInfo::new(&repos),
            tree: ProductTree::new(repos),
            focus: FocusRing::tree_only(),
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn tree(&self) -> &ProductTree {
        &self.tree
    }

    pub fn info(&self) -> &ProductInfo {
        &self.info
    }

    pub fn focused(&self) -> PanelId {
        self.focus.current()
    }

    #[cfg(test)]
    pub fn focus_ring(&self) -> &FocusRing {
        &self.focus
    }

    /// Logs every key before deciding whether it maps to anything.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppCommand {
        debug!(
            widget = self.focused().label(),
            code = ?key.code,
            modifiers = ?key.modifiers,
            "key pressed"
        );
        match input::map_key(key) {
            Some(action) => self.apply_action(action),
            None => AppCommand::None,
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            Action::AdvanceFocus => {
                debug!(widget = self.focused().label(), "detected TAB press");
                self.focus.advance();
                AppCommand::None
            }
            Action::Down => self.move_focused(1),
            Action::Up => self.move_focused(-1),
            Action::PageDown => self.move_focused(PAGE_STEP),
            Action::PageUp => self.move_focused(-PAGE_STEP),
            Action::Top => {
                match self.focused() {
                    PanelId::Tree => self.tree.select_first(),
                    panel => self.scroll_panel_to(panel, 0),
                }
                AppCommand::None
            }
            Action::Bottom => {
                match self.focused() {
                    PanelId::Tree => self.tree.select_last(),
                    panel => self.scroll_panel_to(panel, usize::MAX),
                }
                AppCommand::None
            }
            Action::Activate => {
                if self.focused() != PanelId::Tree {
                    return AppCommand::None;
                }
                match self.tree.activation() {
                    TreeActivation::None => AppCommand::None,
                    TreeActivation::Toggle(kind) => AppCommand::ToggleCategory(kind),
                    TreeActivation::Select { kind, identifier } => {
                        AppCommand::ShowResource { kind, identifier }
                    }
                }
            }
        }
    }

    /// Status shown while `command` blocks the loop.
    pub fn pending_status(&self, command: &AppCommand) -> Option<String> {
        match command {
            AppCommand::None => None,
            AppCommand::ToggleCategory(kind) if self.tree.category(*kind).expanded => None,
            AppCommand::ToggleCategory(kind) => Some(format!("Fetching {}…", kind.plural())),
            AppCommand::ShowResource { kind, identifier } if kind.has_detail_view() => {
                Some(format!("Fetching {} {identifier}…", kind.title()))
            }
            AppCommand::ShowResource { .. } => None,
        }
    }

    pub async fn execute(&mut self, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::None => Ok(()),
            AppCommand::ToggleCategory(kind) => {
                self.tree.toggle_category(kind).await?;
                let category = self.tree.category(kind);
                self.status = if category.expanded {
                    format!("{} {}", category.children.len(), kind.plural())
                } else {
                    format!("{} collapsed", kind.title())
                };
                Ok(())
            }
            AppCommand::ShowResource { kind, identifier } => {
                self.show_resource(kind, &identifier).await
            }
        }
    }

    /// Single selection handler keyed by kind and identifier.
    async fn show_resource(&mut self, kind: ResourceKind, identifier: &str) -> Result<()> {
        if !kind.has_detail_view() {
            debug!(kind = %kind, identifier, "no detail view for resource kind");
            self.status = format!("{kind} {identifier}");
            return Ok(());
        }

        self.info.show_vps(identifier).await?;
        self.rebuild_focus_ring();
        self.status = format!("Showing {} {identifier}", kind.title());
        Ok(())
    }

    fn rebuild_focus_ring(&mut self) {
        self.focus = match self.info.current() {
            Some(info) => {
                let tree: &dyn Focusable = &self.tree;
                let panels = std::iter::once(tree)
                    .chain(info.panels.iter().map(|panel| panel as &dyn Focusable));
                FocusRing::new(panels, PanelId::Overview)
            }
            None => FocusRing::tree_only(),
        };
        debug!(panel = self.focused().label(), "focus ring rebuilt");
    }

    fn move_focused(&mut self, delta: isize) -> AppCommand {
        match self.focused() {
            PanelId::Tree => self.tree.move_selection(delta),
            panel => {
                if let Some(detail) = self
                    .info
                    .current_mut()
                    .and_then(|info| info.panel_mut(panel))
                {
                    detail.table.scroll_by(delta);
                }
            }
        }
        AppCommand::None
    }

    fn scroll_panel_to(&mut self, panel: PanelId, index: usize) {
        if let Some(detail) = self
            .info
            .current_mut()
            .and_then(|info| info.panel_mut(panel))
        {
            detail.table.scroll_to(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand};
    use crate::input::Action;
    use crate::model::{PanelId, ResourceKind};
    use crate::repository::fake::{FakeBackend, FakeState, vps};
    use crate::repository::{Domain, VpsBackup};
    use chrono::{TimeZone, Utc};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::Arc;

    fn backend() -> Arc<FakeBackend> {
        let backups = (0..3)
            .map(|id| VpsBackup {
                id,
                status: "active".to_string(),
                created_at: Utc.with_ymd_and_hms(2023, 1, 2, 15, 4, 5).unwrap(),
                disk_size: 157_286_400,
                availability_zone: "ams0".to_string(),
            })
            .collect();
        FakeBackend::new(FakeState {
            vpses: vec![vps("example-vps", "web")],
            domains: vec![Domain {
                name: "example.com".to_string(),
                ..Domain::default()
            }],
            backups,
            ..FakeState::default()
        })
    }

    fn app(backend: &Arc<FakeBackend>) -> App {
        App::new(backend.repositories(), "swiltink".to_string(), true)
    }

    async fn open_example_vps(app: &mut App) {
        app.apply_action(Action::Down);
        let toggle = app.apply_action(Action::Activate);
        assert_eq!(toggle, AppCommand::ToggleCategory(ResourceKind::Vps));
        app.execute(toggle).await.unwrap();

        app.apply_action(Action::Down);
        let show = app.apply_action(Action::Activate);
        assert_eq!(
            show,
            AppCommand::ShowResource {
                kind: ResourceKind::Vps,
                identifier: "example-vps".to_string()
            }
        );
        app.execute(show).await.unwrap();
    }

    #[test]
    fn quit_stops_the_app() {
        let backend = backend();
        let mut app = app(&backend);
        let command = app.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert_eq!(command, AppCommand::None);
        assert!(!app.running());
    }

    #[test]
    fn tab_without_details_keeps_focus_on_tree() {
        let backend = backend();
        let mut app = app(&backend);
        app.handle_key(KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE));
        assert_eq!(app.focused(), PanelId::Tree);
    }

    #[test]
    fn activating_the_root_does_nothing() {
        let backend = backend();
        let mut app = app(&backend);
        assert_eq!(app.apply_action(Action::Activate), AppCommand::None);
    }

    #[tokio::test]
    async fn showing_a_vps_focuses_the_overview() {
        let backend = backend();
        let mut app = app(&backend);
        open_example_vps(&mut app).await;

        assert_eq!(app.focused(), PanelId::Overview);
        assert_eq!(app.status(), "Showing Vps example-vps");
        assert_eq!(
            app.focus_ring().panels(),
            &[
                PanelId::Tree,
                PanelId::Overview,
                PanelId::Backups,
                PanelId::Snapshots,
                PanelId::Network
            ]
        );
    }

    #[tokio::test]
    async fn tab_cycles_through_every_panel_and_back() {
        let backend = backend();
        let mut app = app(&backend);
        open_example_vps(&mut app).await;

        let tab = KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE);
        let mut visited = Vec::new();
        for _ in 0..5 {
            app.handle_key(tab);
            visited.push(app.focused());
        }
        assert_eq!(
            visited,
            vec![
                PanelId::Backups,
                PanelId::Snapshots,
                PanelId::Network,
                PanelId::Tree,
                PanelId::Overview
            ]
        );
    }

    #[tokio::test]
    async fn movement_scrolls_the_focused_table() {
        let backend = backend();
        let mut app = app(&backend);
        open_example_vps(&mut app).await;
        let tree_cursor = app.tree().selected_index();

        app.apply_action(Action::AdvanceFocus);
        assert_eq!(app.focused(), PanelId::Backups);
        app.apply_action(Action::Down);
        app.apply_action(Action::Bottom);
        assert_eq!(app.apply_action(Action::Activate), AppCommand::None);

        let info = app.info().current().unwrap();
        assert_eq!(info.panel(PanelId::Backups).unwrap().table.scroll, 2);
        assert_eq!(app.tree().selected_index(), tree_cursor);
    }

    #[tokio::test]
    async fn selecting_a_domain_fetches_no_details() {
        let backend = backend();
        let mut app = app(&backend);
        app.apply_action(Action::Bottom);
        let toggle = app.apply_action(Action::Activate);
        assert_eq!(toggle, AppCommand::ToggleCategory(ResourceKind::Domain));
        app.execute(toggle).await.unwrap();

        app.apply_action(Action::Down);
        let show = app.apply_action(Action::Activate);
        assert_eq!(app.pending_status(&show), None);
        app.execute(show).await.unwrap();

        assert!(app.info().current().is_none());
        assert_eq!(app.focused(), PanelId::Tree);
        assert_eq!(backend.state().calls, vec!["domain.list_all"]);
    }

    #[tokio::test]
    async fn failed_show_keeps_focus_and_previous_details() {
        let backend = backend();
        let mut app = app(&backend);
        open_example_vps(&mut app).await;
        app.apply_action(Action::AdvanceFocus);
        app.apply_action(Action::AdvanceFocus);
        app.apply_action(Action::AdvanceFocus);
        app.apply_action(Action::AdvanceFocus);
        assert_eq!(app.focused(), PanelId::Tree);

        backend.state().failing.insert("vps.get_ip_addresses");
        let show = app.apply_action(Action::Activate);
        assert!(app.execute(show).await.is_err());

        assert_eq!(app.focused(), PanelId::Tree);
        assert_eq!(app.info().current().unwrap().name, "example-vps");
    }

    #[tokio::test]
    async fn pending_status_only_for_fetching_commands() {
        let backend = backend();
        let mut app = app(&backend);
        let expand = AppCommand::ToggleCategory(ResourceKind::Vps);
        assert_eq!(
            app.pending_status(&expand).as_deref(),
            Some("Fetching vpses…")
        );
        app.execute(expand.clone()).await.unwrap();
        assert_eq!(app.status(), "1 vpses");
        assert_eq!(app.pending_status(&expand), None);
    }
}
