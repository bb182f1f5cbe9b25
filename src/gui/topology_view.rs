use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use super::{with_terminal, GuiError};
use crate::{
    control::{ControlSession, Event},
    layout::{layout, Layout as NodeLayout},
    topology::{EdgeFlags, Topology},
};

use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind};
use log::{debug, Level};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        canvas::{Canvas, Line as CanvasLine, Points},
        *,
    },
};

/// Nodes drawn at their own coordinates.
pub const LOCATED_COLOR: Color = Color::Rgb(0x00, 0xff, 0xcc);
/// Nodes placed by the fallback layout.
pub const UNLOCATED_COLOR: Color = Color::Rgb(0xc8, 0xc8, 0xc8);

/// The ways an edge can be drawn. An edge is drawn once for every style
/// whose flag it has, in [EdgeStyle::DRAW_ORDER], so a breached beam shows
/// red on top of green.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    RfLink,
    IrLink,
    Beam,
    Breached,
}

impl EdgeStyle {
    /// Every edge style, bottom layer first.
    pub const DRAW_ORDER: [EdgeStyle; 4] = [
        EdgeStyle::RfLink,
        EdgeStyle::IrLink,
        EdgeStyle::Beam,
        EdgeStyle::Breached,
    ];

    pub fn applies(self, flags: &EdgeFlags) -> bool {
        match self {
            EdgeStyle::RfLink => flags.rflink,
            EdgeStyle::IrLink => flags.irlink,
            EdgeStyle::Beam => flags.beam,
            EdgeStyle::Breached => flags.breached,
        }
    }

    pub fn color(self) -> Color {
        match self {
            EdgeStyle::RfLink => Color::Gray,
            EdgeStyle::IrLink => Color::Blue,
            EdgeStyle::Beam => Color::Green,
            EdgeStyle::Breached => Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    from: (f64, f64),
    to: (f64, f64),
    style: EdgeStyle,
}

// Line segments to draw, in drawing order.
fn segments(topology: &Topology, placed: &NodeLayout) -> Vec<Segment> {
    let mut out = Vec::new();
    for style in EdgeStyle::DRAW_ORDER {
        for edge in topology.edges.iter().filter(|e| style.applies(&e.flags)) {
            let (Some(from), Some(to)) = (placed.position(&edge.from), placed.position(&edge.to))
            else {
                debug!("edge {} -> {} has an unplaced end", edge.from, edge.to);
                continue;
            };
            out.push(Segment { from, to, style });
        }
    }
    out
}

struct App {
    shared: Arc<Mutex<ControlSession>>,
    title: String,
    revision: Option<u64>,
    topology: Option<Topology>,
    placed: Option<NodeLayout>,
    segments: Vec<Segment>,
    history: Vec<Event>,
}

impl App {
    fn new(shared: Arc<Mutex<ControlSession>>, title: &str) -> App {
        App {
            shared,
            title: title.to_owned(),
            revision: None,
            topology: None,
            placed: None,
            segments: vec![],
            history: vec![],
        }
    }

    // Take a copy of whatever changed, holding the lock as briefly as
    // possible so the reader isn't held up.
    fn on_tick(&mut self) -> Result<(), GuiError> {
        let session = self.shared.lock()?;
        let revision = session.revision();
        let changed = self.revision != Some(revision);
        if changed {
            self.revision = Some(revision);
            self.topology = session.topology().cloned();
        }
        self.history = session.history().cloned().collect();
        drop(session);

        if changed {
            match &self.topology {
                Some(topology) => {
                    let placed = layout(topology);
                    self.segments = segments(topology, &placed);
                    self.placed = Some(placed);
                }
                None => {
                    self.segments.clear();
                    self.placed = None;
                }
            }
        }
        Ok(())
    }
}

fn level_style(level: Level) -> Style {
    match level {
        Level::Error => Style::default().fg(Color::Red),
        Level::Warn => Style::default().fg(Color::Yellow),
        Level::Info => Style::default().fg(Color::White),
        Level::Debug | Level::Trace => Style::default().fg(Color::DarkGray),
    }
}

fn draw_graph(f: &mut Frame, area: Rect, app: &App, block: Block) {
    let Some(placed) = &app.placed else {
        let waiting = Paragraph::new("waiting for a graph...")
            .style(Style::default().fg(UNLOCATED_COLOR).bg(Color::Black))
            .block(block);
        f.render_widget(waiting, area);
        return;
    };

    let canvas = Canvas::default()
        .block(block)
        .background_color(Color::Black)
        .marker(symbols::Marker::Braille)
        .x_bounds(placed.x_bounds)
        .y_bounds(placed.y_bounds)
        .paint(|ctx| {
            for style in EdgeStyle::DRAW_ORDER {
                for seg in app.segments.iter().filter(|s| s.style == style) {
                    ctx.draw(&CanvasLine {
                        x1: seg.from.0,
                        y1: seg.from.1,
                        x2: seg.to.0,
                        y2: seg.to.1,
                        color: style.color(),
                    });
                }
                ctx.layer();
            }

            for node in &placed.placed {
                let color = if node.located {
                    LOCATED_COLOR
                } else {
                    UNLOCATED_COLOR
                };
                ctx.draw(&Points {
                    coords: &[(node.x, node.y)],
                    color,
                });
            }
            ctx.layer();

            for node in &placed.placed {
                let color = if node.located {
                    LOCATED_COLOR
                } else {
                    UNLOCATED_COLOR
                };
                ctx.print(
                    node.x,
                    node.y,
                    Span::styled(
                        node.id.clone(),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ),
                );
            }
        });
    f.render_widget(canvas, area);
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(f.size());

    let title = Title::from(Span::from(format!(" {} ", app.title)).cyan().bold());
    let instructions = Title::from(Line::from(vec![" Quit ".into(), "<Q> ".cyan().bold()]));
    let graph_block = Block::default()
        .title(title.alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL);
    draw_graph(f, chunks[0], app, graph_block);

    let visible = chunks[1].height.saturating_sub(2) as usize;
    let skip = app.history.len().saturating_sub(visible);
    let items: Vec<ListItem> = app.history[skip..]
        .iter()
        .map(|e| ListItem::new(e.text.as_str()).style(level_style(e.level)))
        .collect();
    let history = List::new(items).block(Block::default().title(" Events ").borders(Borders::ALL));
    f.render_widget(history, chunks[1]);
}

/// Show the topology held by `shared`, checking for changes every `tick`,
/// until the user presses `q`.
pub fn topology_view(
    shared: Arc<Mutex<ControlSession>>,
    tick: Duration,
    title: &str,
) -> Result<(), GuiError> {
    let mut app = App::new(shared, title);
    app.on_tick()?;

    with_terminal(|terminal| {
        let mut last_tick = Instant::now();
        loop {
            terminal.draw(|f| ui(f, &app))?;

            let timeout = tick
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));
            if event::poll(timeout)? {
                if let TermEvent::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                        return Ok(());
                    }
                }
            }
            if last_tick.elapsed() >= tick {
                app.on_tick()?;
                last_tick = Instant::now();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::StreamMode;

    fn shared() -> Arc<Mutex<ControlSession>> {
        Arc::new(Mutex::new(ControlSession::new(
            StreamMode::Control,
            "CTRL: ",
            false,
        )))
    }

    #[test]
    fn segments_follow_flags() {
        let s = shared();
        {
            let mut session = s.lock().unwrap();
            session.handle_line("CTRL: digraph RF { 0 -> 1; 1 -> 2; }");
            session.handle_line("CTRL: digraph IR { 1 -> 2; }");
            session.handle_line("CTRL: fence: 1:2 2:1");
        }
        let mut app = App::new(s, "test");
        app.on_tick().unwrap();

        let styles: Vec<EdgeStyle> = app.segments.iter().map(|s| s.style).collect();
        assert_eq!(
            styles,
            vec![
                EdgeStyle::RfLink,
                EdgeStyle::RfLink,
                EdgeStyle::IrLink,
                EdgeStyle::Breached
            ]
        );
        let placed = app.placed.as_ref().unwrap();
        assert_eq!(app.segments[0].from, placed.position("0").unwrap());
    }

    #[test]
    fn follows_revisions() {
        let s = shared();
        let mut app = App::new(s.clone(), "test");
        app.on_tick().unwrap();
        assert!(app.topology.is_none());
        assert!(app.placed.is_none());

        s.lock()
            .unwrap()
            .handle_line("CTRL: digraph RF { 0 -> 1; }");
        app.on_tick().unwrap();
        assert_eq!(app.topology.as_ref().unwrap().nodes.len(), 2);

        s.lock()
            .unwrap()
            .handle_line("CTRL: digraph RF { 0 -> 1; 1 -> 2; }");
        app.on_tick().unwrap();
        assert_eq!(app.placed.as_ref().unwrap().placed.len(), 3);
        assert_eq!(app.history.len(), 2);
    }

    #[test]
    fn colors() {
        assert_eq!(EdgeStyle::Breached.color(), Color::Red);
        assert!(EdgeStyle::Beam.applies(&EdgeFlags {
            beam: true,
            ..Default::default()
        }));
        assert!(!EdgeStyle::RfLink.applies(&EdgeFlags::default()));
    }
}
