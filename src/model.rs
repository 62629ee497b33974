use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Vps,
    BigStorage,
    Haip,
    Domain,
}

impl ResourceKind {
    pub const ALL: [Self; 4] = [Self::Vps, Self::BigStorage, Self::Haip, Self::Domain];

    pub fn title(self) -> &'static str {
        match self {
            Self::Vps => "Vps",
            Self::BigStorage => "BigStorage",
            Self::Haip => "Haip",
            Self::Domain => "Domain",
        }
    }

    /// Plural used in log and status messages ("fetching vpses").
    pub fn plural(self) -> &'static str {
        match self {
            Self::Vps => "vpses",
            Self::BigStorage => "bigstorages",
            Self::Haip => "haips",
            Self::Domain => "domains",
        }
    }

    /// Whether selecting a resource of this kind opens a detail view.
    pub fn has_detail_view(self) -> bool {
        matches!(self, Self::Vps)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// A single resource listed under an expanded category.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResourceNode {
    pub label: String,
    pub identifier: String,
    pub kind: ResourceKind,
}

impl ResourceNode {
    pub fn described(kind: ResourceKind, name: String, description: &str) -> Self {
        Self {
            label: format!("{name} ({description})"),
            identifier: name,
            kind,
        }
    }

    pub fn bare(kind: ResourceKind, name: String) -> Self {
        Self {
            label: name.clone(),
            identifier: name,
            kind,
        }
    }
}

/// Every panel that can own keyboard input.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PanelId {
    Tree,
    Overview,
    Backups,
    Snapshots,
    Network,
}

impl PanelId {
    pub fn label(self) -> &'static str {
        match self {
            Self::Tree => "productlist",
            Self::Overview => "vps overview",
            Self::Backups => "vps backups",
            Self::Snapshots => "vps snapshots",
            Self::Network => "vps network",
        }
    }
}

/// One read-only key/value or header+rows table of the detail view.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DetailTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub scroll: usize,
}

impl DetailTable {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Value column of the first row whose label matches.
    #[cfg(test)]
    pub fn value_of(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.first().is_some_and(|cell| cell == label))
            .and_then(|row| row.get(1))
            .map(String::as_str)
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let max = self.rows.len().saturating_sub(1);
        self.scroll = self.scroll.saturating_add_signed(delta).min(max);
    }

    pub fn scroll_to(&mut self, index: usize) {
        self.scroll = index.min(self.rows.len().saturating_sub(1));
    }
}
