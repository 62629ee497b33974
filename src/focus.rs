use crate::model::PanelId;
use tracing::debug;

/// Anything that can own keyboard input.
pub trait Focusable {
    fn panel(&self) -> PanelId;
}

impl Focusable for PanelId {
    fn panel(&self) -> PanelId {
        *self
    }
}

/// Fixed cyclic order in which focus advances. Built once per detail view.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FocusRing {
    panels: Vec<PanelId>,
    current: usize,
}

impl FocusRing {
    /// Registers `panels` in order. Focus starts on `initial` when it is part of the ring,
    /// otherwise on the first panel.
    pub fn new<'a, I>(panels: I, initial: PanelId) -> Self
    where
        I: IntoIterator<Item = &'a dyn Focusable>,
    {
        let mut registered = Vec::new();
        for panel in panels {
            let id = panel.panel();
            if !registered.contains(&id) {
                registered.push(id);
            }
        }
        if registered.is_empty() {
            registered.push(PanelId::Tree);
        }
        let current = registered
            .iter()
            .position(|panel| *panel == initial)
            .unwrap_or(0);
        Self {
            panels: registered,
            current,
        }
    }

    /// Ring holding only the navigation tree, used until a resource is shown.
    pub fn tree_only() -> Self {
        Self {
            panels: vec![PanelId::Tree],
            current: 0,
        }
    }

    pub fn current(&self) -> PanelId {
        self.panels[self.current]
    }

    #[cfg(test)]
    pub fn panels(&self) -> &[PanelId] {
        &self.panels
    }

    /// Moves to the next panel, wrapping past the end.
    pub fn advance(&mut self) -> PanelId {
        let from = self.current();
        self.current = (self.current + 1) % self.panels.len();
        let to = self.current();
        debug!(from = from.label(), to = to.label(), "changing focus");
        to
    }
}

impl Default for FocusRing {
    fn default() -> Self {
        Self::tree_only()
    }
}
