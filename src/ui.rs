use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap,
};

use crate::app::App;
use crate::detail::{DetailPanel, VpsInfo};
use crate::model::PanelId;
use crate::tree::{ProductTree, ROOT_LABEL, TreeRow};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);

/// Detail views wider than this get two columns.
pub const WIDE_LAYOUT_MIN_WIDTH: u16 = 101;

const KEY_HINTS: &str = " tab focus  enter open  j/k move  q quit ";

/// Where each detail panel goes inside the detail area.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DetailLayout {
    pub overview: Rect,
    pub backups: Rect,
    pub snapshots: Rect,
    pub network: Rect,
}

impl DetailLayout {
    fn area_of(&self, panel: PanelId) -> Option<Rect> {
        match panel {
            PanelId::Tree => None,
            PanelId::Overview => Some(self.overview),
            PanelId::Backups => Some(self.backups),
            PanelId::Snapshots => Some(self.snapshots),
            PanelId::Network => Some(self.network),
        }
    }
}

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    let (tree_area, detail_area) = body_layout(root[1]);
    render_tree(frame, tree_area, app.tree(), app.focused() == PanelId::Tree);
    render_detail(frame, detail_area, app);
    render_footer(frame, root[2], app);
}

/// Tree on the left quarter, details on the rest.
pub fn body_layout(area: Rect) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4), Constraint::Ratio(3, 4)])
        .split(area);
    (chunks[0], chunks[1])
}

pub fn detail_layout(area: Rect) -> DetailLayout {
    if area.width < WIDE_LAYOUT_MIN_WIDTH {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(9),
                Constraint::Fill(1),
                Constraint::Fill(1),
                Constraint::Fill(1),
            ])
            .split(area);
        return DetailLayout {
            overview: rows[0],
            backups: rows[1],
            snapshots: rows[2],
            network: rows[3],
        };
    }

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9),
            Constraint::Fill(1),
            Constraint::Fill(1),
        ])
        .split(columns[0]);
    DetailLayout {
        overview: left[0],
        backups: left[1],
        snapshots: left[2],
        network: columns[1],
    }
}

/// Text of every visible tree row, indented by depth.
pub fn tree_lines(tree: &ProductTree) -> Vec<String> {
    tree.rows()
        .into_iter()
        .map(|row| match row {
            TreeRow::Root => ROOT_LABEL.to_string(),
            TreeRow::Category(kind) => {
                let marker = if tree.category(kind).expanded { "▾" } else { "▸" };
                format!("  {marker} {}", kind.title())
            }
            TreeRow::Resource { kind, index } => tree
                .node(kind, index)
                .map(|node| format!("      {}", node.label))
                .unwrap_or_default(),
        })
        .collect()
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    let account_bg = if app.test_mode() { WARN } else { BG };
    push_powerline_segment(&mut spans, " 󰒋 transterm ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(app.account(), 32)),
        Color::White,
        PL_B,
        account_bg,
    );
    if app.test_mode() {
        push_powerline_segment(&mut spans, " test mode ", Color::Black, WARN, BG);
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG).fg(Color::White)),
        area,
    );
}

fn render_tree(frame: &mut Frame, area: Rect, tree: &ProductTree, focused: bool) {
    let items = tree_lines(tree)
        .into_iter()
        .map(|line| ListItem::new(line).style(Style::default().fg(Color::White)))
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(panel_block("Products".to_string(), focused))
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    state.select(Some(tree.selected_index()));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_detail(frame: &mut Frame, area: Rect, app: &App) {
    let Some(info) = app.info().current() else {
        let hint = Paragraph::new("Select a VPS in the product list to show its details.")
            .wrap(Wrap { trim: false })
            .block(panel_block("Details".to_string(), false))
            .style(Style::default().fg(MUTED));
        frame.render_widget(hint, area);
        return;
    };

    let layout = detail_layout(area);
    for panel in &info.panels {
        if let Some(panel_area) = layout.area_of(panel.id) {
            render_panel(frame, panel_area, info, panel, app.focused() == panel.id);
        }
    }
}

fn render_panel(frame: &mut Frame, area: Rect, info: &VpsInfo, panel: &DetailPanel, focused: bool) {
    let table = &panel.table;
    let title = if panel.id == PanelId::Overview {
        format!("{} {}", table.title, info.name)
    } else {
        format!("{} ({})", table.title, table.rows.len())
    };

    let columns = table
        .headers
        .len()
        .max(table.rows.iter().map(Vec::len).max().unwrap_or(0))
        .max(1);
    let rows = table.rows.iter().map(|cells| {
        Row::new(cells.iter().enumerate().map(|(index, cell)| {
            let style = if table.headers.is_empty() && index == 0 {
                Style::default().fg(MUTED).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Cell::from(cell.clone()).style(style)
        }))
    });

    let mut widget = Table::new(rows, column_constraints(columns))
        .block(panel_block(title, focused))
        .column_spacing(1);
    if !table.headers.is_empty() {
        widget = widget.header(
            Row::new(table.headers.iter().map(|header| {
                Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
            }))
            .style(Style::default().fg(ACCENT)),
        );
    }
    if focused {
        widget = widget.row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        );
    }

    let mut state = TableState::default();
    if !table.rows.is_empty() {
        state.select(Some(table.scroll));
    }
    frame.render_stateful_widget(widget, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.focused().label()),
        Color::White,
        PL_A,
        PL_B,
    );
    let status_width = area.width.saturating_sub(KEY_HINTS.chars().count() as u16 + 24);
    push_powerline_segment(
        &mut spans,
        format!(
            " {} ",
            compact_text(app.status(), (status_width as usize).max(16))
        ),
        Color::White,
        PL_B,
        BG,
    );

    let hints_width = KEY_HINTS.chars().count() as u16;
    if spans_width(&spans) as u16 + hints_width >= area.width {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(hints_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(KEY_HINTS)
            .style(Style::default().bg(BG).fg(MUTED))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL))
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}
