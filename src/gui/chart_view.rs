use std::time::Duration;

use super::{with_terminal, GuiError};
use crate::figure::{Figure, Panel, SeriesKind};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    prelude::*,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
};

// Three evenly spaced labels across `bounds`.
fn axis_labels((lo, hi): (f64, f64)) -> Vec<Span<'static>> {
    [lo, (lo + hi) / 2.0, hi]
        .iter()
        .map(|v| Span::from(format!("{:.2}", v)))
        .collect()
}

fn draw_panel(f: &mut Frame, area: Rect, panel: &Panel) {
    let datasets = panel
        .series
        .iter()
        .map(|series| {
            let (r, g, b) = series.color;
            let graph_type = match series.kind {
                SeriesKind::Line | SeriesKind::LineMarkers => GraphType::Line,
                SeriesKind::Scatter => GraphType::Scatter,
            };
            let dataset = Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(graph_type)
                .style(Style::default().fg(Color::Rgb(r, g, b)))
                .data(&series.points);
            match &series.label {
                Some(label) => dataset.name(label.as_str()),
                None => dataset,
            }
        })
        .collect();

    let x_title = panel.x_label.as_deref().unwrap_or("");
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(panel.title.as_str().bold())
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title(Span::styled(x_title, Style::default().fg(Color::Gray)))
                .style(Style::default().fg(Color::White))
                .bounds([panel.x_range.0, panel.x_range.1])
                .labels(axis_labels(panel.x_range)),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled(
                    panel.y_label.as_str(),
                    Style::default().fg(Color::Gray),
                ))
                .style(Style::default().fg(Color::White))
                .bounds([panel.y_range.0, panel.y_range.1])
                .labels(axis_labels(panel.y_range)),
        );
    f.render_widget(chart, area);
}

/// Show `figure` in the terminal, panels stacked top to bottom, until the
/// user presses `q`.
pub fn chart_view(figure: &Figure) -> Result<(), GuiError> {
    with_terminal(|terminal| loop {
        terminal.draw(|f| {
            let n = figure.panels.len().max(1) as u32;
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(vec![Constraint::Ratio(1, n); n as usize])
                .split(f.size());
            for (area, panel) in chunks.iter().zip(&figure.panels) {
                draw_panel(f, *area, panel);
            }
        })?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                    return Ok(());
                }
            }
        }
    })
}
