use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, error};

use crate::focus::Focusable;
use crate::model::{PanelId, ResourceKind, ResourceNode};
use crate::repository::{ApiResult, Repositories};

pub const ROOT_LABEL: &str = "Products";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResourceCategory {
    pub kind: ResourceKind,
    pub expanded: bool,
    pub children: Vec<ResourceNode>,
}

impl ResourceCategory {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            expanded: false,
            children: Vec::new(),
        }
    }
}

/// A visible line of the tree.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TreeRow {
    Root,
    Category(ResourceKind),
    Resource { kind: ResourceKind, index: usize },
}

/// What activating the row under the cursor should do.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TreeActivation {
    None,
    Toggle(ResourceKind),
    Select {
        kind: ResourceKind,
        identifier: String,
    },
}

pub struct ProductTree {
    repos: Repositories,
    categories: Vec<ResourceCategory>,
    selected: usize,
}

impl ProductTree {
    pub fn new(repos: Repositories) -> Self {
        debug!(element = "productList", "initialising UI");
        Self {
            repos,
            categories: ResourceKind::ALL
                .iter()
                .copied()
                .map(ResourceCategory::new)
                .collect(),
            selected: 0,
        }
    }

    pub fn category(&self, kind: ResourceKind) -> &ResourceCategory {
        let index = category_index(kind);
        &self.categories[index]
    }

    pub fn node(&self, kind: ResourceKind, index: usize) -> Option<&ResourceNode> {
        self.category(kind).children.get(index)
    }

    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = vec![TreeRow::Root];
        for category in &self.categories {
            rows.push(TreeRow::Category(category.kind));
            if category.expanded {
                rows.extend((0..category.children.len()).map(|index| TreeRow::Resource {
                    kind: category.kind,
                    index,
                }));
            }
        }
        rows
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_row(&self) -> TreeRow {
        self.rows()
            .get(self.selected)
            .copied()
            .unwrap_or(TreeRow::Root)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let last = self.rows().len().saturating_sub(1);
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.rows().len().saturating_sub(1);
    }

    pub fn activation(&self) -> TreeActivation {
        match self.selected_row() {
            TreeRow::Root => TreeActivation::None,
            TreeRow::Category(kind) => TreeActivation::Toggle(kind),
            TreeRow::Resource { kind, index } => match self.node(kind, index) {
                Some(node) => TreeActivation::Select {
                    kind,
                    identifier: node.identifier.clone(),
                },
                None => TreeActivation::None,
            },
        }
    }

    /// Flips the category open or closed. Opening always re-fetches and replaces the
    /// children. A failed fetch leaves the children untouched and the category closed.
    pub async fn toggle_category(&mut self, kind: ResourceKind) -> Result<()> {
        let index = category_index(kind);
        let expanded = !self.categories[index].expanded;
        self.categories[index].expanded = expanded;
        debug!(kind = %kind, expanded, "product category selected");

        if !expanded {
            self.clamp_selection();
            return Ok(());
        }

        debug!(kind = %kind, "fetching {}", kind.plural());
        let started = Instant::now();
        match self.fetch_nodes(kind).await {
            Ok(nodes) => {
                debug!(
                    kind = %kind,
                    count = nodes.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "done fetching {}",
                    kind.plural()
                );
                self.categories[index].children = nodes;
                self.clamp_selection();
                Ok(())
            }
            Err(fetch_error) => {
                error!(
                    kind = %kind,
                    error = %fetch_error,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "error fetching {}",
                    kind.plural()
                );
                self.categories[index].expanded = false;
                self.clamp_selection();
                Err(fetch_error).with_context(|| format!("failed to fetch {}", kind.plural()))
            }
        }
    }

    async fn fetch_nodes(&self, kind: ResourceKind) -> ApiResult<Vec<ResourceNode>> {
        let nodes = match kind {
            ResourceKind::Vps => self
                .repos
                .vps
                .list_all()
                .await?
                .into_iter()
                .map(|vps| ResourceNode::described(kind, vps.name, &vps.description))
                .collect(),
            ResourceKind::BigStorage => self
                .repos
                .big_storage
                .list_all()
                .await?
                .into_iter()
                .map(|storage| ResourceNode::described(kind, storage.name, &storage.description))
                .collect(),
            ResourceKind::Haip => self
                .repos
                .haip
                .list_all()
                .await?
                .into_iter()
                .map(|haip| ResourceNode::described(kind, haip.name, &haip.description))
                .collect(),
            ResourceKind::Domain => self
                .repos
                .domain
                .list_all()
                .await?
                .into_iter()
                .map(|domain| ResourceNode::bare(kind, domain.name))
                .collect(),
        };
        Ok(nodes)
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.rows().len().saturating_sub(1));
    }
}

impl Focusable for ProductTree {
    fn panel(&self) -> PanelId {
        PanelId::Tree
    }
}

fn category_index(kind: ResourceKind) -> usize {
    ResourceKind::ALL
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(0)
}
