//! Terminal UI rendering.
//!
//! All drawing logic lives here, separated from application state ([`App`])
//! and input handling ([`crate::input`]).  This makes it easy to change the
//! visual layout without touching business logic.
//!
//! ## For contributors
//!
//! * The layout is a two-row split: the timeline on top and a one-line
//!   status bar at the bottom.
//! * Pending items (published locally, not yet confirmed) are dimmed.
//! * [`ratatui`] is the TUI framework; see its docs for widget details.

use chrono::DateTime;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use livescroll::{Item, SortType};

use crate::app::App;

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [main_area, status_area] = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_timeline(app, frame, main_area);
    draw_status_bar(app, frame, status_area);
}

fn date_label(item: &Item) -> String {
    DateTime::from_timestamp(item.timestamp, 0)
        .filter(|_| item.timestamp > 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "no date".into())
}

fn item_line(item: &Item, sort: SortType) -> Line<'static> {
    let title_style = if item.pending {
        Style::default().fg(Color::Gray).add_modifier(Modifier::DIM)
    } else {
        Style::default().fg(Color::White)
    };

    let mut spans = vec![
        Span::styled(
            format!("{:<18}", date_label(item)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
    ];
    if sort != SortType::New {
        spans.push(Span::styled(
            format!("{:>5} ", item.score()),
            Style::default().fg(Color::Magenta),
        ));
    }
    spans.push(Span::styled(
        item.title.clone().unwrap_or_else(|| "(untitled)".into()),
        title_style,
    ));
    if item.pending {
        spans.push(Span::styled(" (pending)", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("[{}]", item.author_address),
        Style::default().fg(Color::Cyan),
    ));
    Line::from(spans)
}

/// Render the scrollable timeline.
fn draw_timeline(app: &mut App, frame: &mut Frame, area: Rect) {
    let sort = app.sort;
    let list_items: Vec<ListItem> = app
        .items()
        .iter()
        .map(|item| ListItem::new(item_line(item, sort)))
        .collect();

    let list = List::new(list_items)
        .block(
            Block::default()
                .title(format!(" livescroll · {sort} "))
                .borders(Borders::ALL),
        )
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, area, &mut app.list_state);
}

/// Render the bottom status bar.
fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let status = Paragraph::new(Line::from(vec![
        Span::styled(" ", Style::default()),
        Span::styled(&app.status, Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(
            format!("{} items", app.items().len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} buffered", app.buffered()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  q: quit  ↑/↓: scroll  s: sort  r: reload"),
    ]));
    frame.render_widget(status, area);
}
