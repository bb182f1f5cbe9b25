//! The control stream: lines the fence master prints for the host, prefixed
//! with `CTRL: ` to tell them apart from its debug output. Two messages are
//! understood:
//!
//! - `digraph <RF|IR|LOC> { ... }`, a topology graph in DOT (older firmware
//!   puts an extra `RF: ` in front of the RF graph)
//! - `fence: <node>:<status> <node>:<status> ...`, the fence posts in order
//!   with the status of the section starting at each post
//!
//! A [ControlSession] folds these into a [Topology]. Bad input is reported
//! and dropped; it never ends the session.

use crate::{
    dot::DotGraph,
    topology::{FencePost, SectionStatus, Topology, TopologyError, UpdateKind},
};

use log::{debug, warn, Level};
use nom::{
    bytes::complete::{is_not, tag},
    character::complete::{char, i32, space0, space1},
    combinator::{all_consuming, map},
    multi::separated_list0,
    sequence::{delimited, preceded, separated_pair},
    Finish, IResult,
};
use std::{collections::VecDeque, fmt};

/// How many recent events a session remembers for display.
pub const HISTORY_LEN: usize = 64;

const RF_WORKAROUND_PREFIX: &str = "RF: ";

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// DOT text of a topology graph, not yet parsed
    Graph(String),
    /// Fence posts in order
    Fence(Vec<FencePost>),
}

/// Why a control line was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Returned for a line that is neither a graph nor a fence report.
    UnexpectedMessage(String),

    /// Returned when a fence report has a post that isn't `<node>:<status>`.
    BadFence(String),

    /// Returned when the DOT text doesn't parse. Holds the unparsed rest.
    BadGraph(String),

    /// Returned for a fence report that arrives before any graph.
    FenceBeforeGraph,

    /// Returned when a graph can't be folded into the topology.
    Topology(TopologyError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlError::UnexpectedMessage(msg) => write!(f, "unexpected msg: '{}'", msg),
            ControlError::BadFence(msg) => write!(f, "malformed fence report: '{}'", msg),
            ControlError::BadGraph(rest) => write!(f, "failed to parse graph near '{}'", rest),
            ControlError::FenceBeforeGraph => write!(f, "fence section before graph"),
            ControlError::Topology(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<TopologyError> for ControlError {
    fn from(value: TopologyError) -> Self {
        Self::Topology(value)
    }
}

fn parse_post(s: &str) -> IResult<&str, FencePost> {
    map(
        separated_pair(is_not(" \t:"), char(':'), i32),
        |(node, code): (&str, i32)| FencePost {
            node: node.to_owned(),
            status: SectionStatus::from(code),
        },
    )(s)
}

fn parse_fence(s: &str) -> IResult<&str, Vec<FencePost>> {
    preceded(
        tag("fence:"),
        delimited(space0, separated_list0(space1, parse_post), space0),
    )(s)
}

impl ControlMessage {
    /// Decode the body of a control line (the part after the prefix).
    pub fn parse(body: &str) -> Result<Self, ControlError> {
        let body = body.trim_end_matches(['\r', '\n']);
        let graph_text = body.strip_prefix(RF_WORKAROUND_PREFIX).unwrap_or(body);
        if graph_text.starts_with("digraph") {
            return Ok(ControlMessage::Graph(graph_text.to_owned()));
        }

        if body.starts_with("fence:") {
            return match all_consuming(parse_fence)(body).finish() {
                Ok((_remaining, posts)) => Ok(ControlMessage::Fence(posts)),
                Err(_) => Err(ControlError::BadFence(body.to_owned())),
            };
        }

        Err(ControlError::UnexpectedMessage(body.to_owned()))
    }
}

/// Collects multi-line DOT blocks, from a `graph ...` or `digraph ...` line
/// through the closing `}` line, as printed by the lab 3 routing nodes.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    current: Option<String>,
    last: Option<String>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn starts_block(line: &str) -> bool {
        let line = line.trim_start();
        ["graph ", "digraph ", "strict "]
            .iter()
            .any(|kw| line.starts_with(kw))
    }

    /// Feed one line. Returns the text of a block when this line completes
    /// one and it differs from the previous block.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches(['\r', '\n']);

        let opens = Self::starts_block(line);
        if opens {
            if self.current.is_some() {
                debug!("block restarted before it was closed");
            }
            self.current = Some(String::new());
        }

        let block = self.current.as_mut()?;
        block.push_str(line);
        block.push('\n');

        // a block closes on a `}` line, or on its own first line when it
        // fits on one
        let closes =
            line.trim_start().starts_with('}') || (opens && line.trim_end().ends_with('}'));
        if !closes {
            return None;
        }

        let block = self.current.take()?;
        if self.last.as_deref() == Some(block.as_str()) {
            return None;
        }
        self.last = Some(block.clone());
        Some(block)
    }
}

/// How a session reads its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Prefixed control lines, graphs merged into one topology
    Control,
    /// Bare multi-line DOT blocks, each one replacing the last
    Blocks,
}

/// What a session did with a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not a control line, or part of a block that isn't complete yet
    Ignored,
    /// Same graph as last time, dropped because dedup is on
    Unchanged,
    /// The topology changed and should be drawn again
    Redraw,
    /// The line was bad; the topology is untouched
    Rejected(ControlError),
}

/// Something worth showing the user, newest last.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub level: Level,
    pub text: String,
}

/// Control stream state: the merged topology and what's needed to fold the
/// next message into it.
#[derive(Debug)]
pub struct ControlSession {
    mode: StreamMode,
    prefix: String,
    dedup: bool,
    prev_graph: Option<String>,
    blocks: BlockAssembler,
    topology: Option<Topology>,
    revision: u64,
    history: VecDeque<Event>,
}

impl ControlSession {
    /// A session reading `mode` input. `prefix` marks control lines;
    /// `dedup` drops graphs identical to the last one accepted.
    pub fn new(mode: StreamMode, prefix: &str, dedup: bool) -> Self {
        Self {
            mode,
            prefix: prefix.to_owned(),
            dedup,
            prev_graph: None,
            blocks: BlockAssembler::new(),
            topology: None,
            revision: 0,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// The merged topology, once a graph has been accepted.
    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    /// Bumped every time the topology changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Recent events, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Event> {
        self.history.iter()
    }

    /// Log `text` and keep it in the history.
    pub fn record(&mut self, level: Level, text: String) {
        log::log!(level, "{}", text);
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(Event { level, text });
    }

    /// Handle one line of device output.
    pub fn handle_line(&mut self, line: &str) -> Outcome {
        let line = line.trim_end_matches(['\r', '\n']);
        let res = match self.mode {
            StreamMode::Control => match line.strip_prefix(self.prefix.as_str()) {
                Some(body) => self.handle_message(body),
                None => {
                    debug!("device: {}", line);
                    return Outcome::Ignored;
                }
            },
            StreamMode::Blocks => match self.blocks.feed(line) {
                Some(block) => self.handle_block(&block),
                None => return Outcome::Ignored,
            },
        };

        match res {
            Ok(outcome) => outcome,
            Err(error) => {
                self.record(Level::Warn, format!("dropped: {}", error));
                Outcome::Rejected(error)
            }
        }
    }

    fn handle_message(&mut self, body: &str) -> Result<Outcome, ControlError> {
        match ControlMessage::parse(body)? {
            ControlMessage::Graph(text) => self.handle_graph(text),
            ControlMessage::Fence(posts) => self.handle_fence(&posts),
        }
    }

    fn handle_graph(&mut self, text: String) -> Result<Outcome, ControlError> {
        if self.dedup && self.prev_graph.as_deref() == Some(text.as_str()) {
            return Ok(Outcome::Unchanged);
        }
        debug!("new graph: {}", text);

        let graph: DotGraph = text
            .parse()
            .map_err(|e: nom::error::Error<String>| ControlError::BadGraph(e.input))?;
        let kind = UpdateKind::from_name(graph.name())
            .ok_or_else(|| TopologyError::UnknownGraph(graph.name().to_owned()))?;

        let topology = self
            .topology
            .get_or_insert_with(|| Topology::from_graph(&graph));
        topology.apply(&graph)?;

        self.prev_graph = Some(text);
        self.revision += 1;
        self.record(
            Level::Info,
            format!(
                "{:?} graph: {} nodes, {} edges",
                kind,
                graph.nodes.len(),
                graph.edges.len()
            ),
        );
        Ok(Outcome::Redraw)
    }

    fn handle_fence(&mut self, posts: &[FencePost]) -> Result<Outcome, ControlError> {
        let topology = self
            .topology
            .as_mut()
            .ok_or(ControlError::FenceBeforeGraph)?;
        let marked = topology.apply_fence(posts);

        self.revision += 1;
        let nodes: Vec<&str> = posts.iter().map(|p| p.node.as_str()).collect();
        self.record(
            Level::Info,
            format!("fence: {} ({} sections)", nodes.join(" "), marked),
        );
        Ok(Outcome::Redraw)
    }

    fn handle_block(&mut self, block: &str) -> Result<Outcome, ControlError> {
        let graph: DotGraph = block
            .parse()
            .map_err(|e: nom::error::Error<String>| ControlError::BadGraph(e.input))?;
        Ok(self.replace_graph(&graph))
    }

    /// Show `graph` as it is, dropping everything known so far.
    pub fn replace_graph(&mut self, graph: &DotGraph) -> Outcome {
        self.topology
            .get_or_insert_with(Topology::default)
            .replace_with(graph);
        self.revision += 1;
        self.record(
            Level::Info,
            format!(
                "graph {}: {} nodes, {} edges",
                graph.name(),
                graph.nodes.len(),
                graph.edges.len()
            ),
        );
        if graph.nodes.is_empty() {
            warn!("received an empty graph");
        }
        Outcome::Redraw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(dedup: bool) -> ControlSession {
        ControlSession::new(StreamMode::Control, "CTRL: ", dedup)
    }

    #[test]
    fn message_kinds() {
        assert_eq!(
            ControlMessage::parse("digraph RF { 0 -> 1; }\r\n"),
            Ok(ControlMessage::Graph("digraph RF { 0 -> 1; }".to_owned()))
        );
        assert_eq!(
            ControlMessage::parse("RF: digraph RF { }"),
            Ok(ControlMessage::Graph("digraph RF { }".to_owned()))
        );
        assert_eq!(
            ControlMessage::parse("fence: 1:1 2:2 3:0 "),
            Ok(ControlMessage::Fence(vec![
                FencePost {
                    node: "1".into(),
                    status: SectionStatus::Active
                },
                FencePost {
                    node: "2".into(),
                    status: SectionStatus::Breached
                },
                FencePost {
                    node: "3".into(),
                    status: SectionStatus::None
                },
            ]))
        );
        assert_eq!(
            ControlMessage::parse("fence: "),
            Ok(ControlMessage::Fence(vec![]))
        );
        assert!(matches!(
            ControlMessage::parse("fence: 1:x"),
            Err(ControlError::BadFence(_))
        ));
        assert!(matches!(
            ControlMessage::parse("routes: 1 2 3"),
            Err(ControlError::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn non_control_lines_are_ignored() {
        let mut s = session(false);
        assert_eq!(s.handle_line("sending ping to 3\r\n"), Outcome::Ignored);
        assert!(s.topology().is_none());
        assert_eq!(s.revision(), 0);
    }

    #[test]
    fn graphs_merge() {
        let mut s = session(false);
        assert_eq!(
            s.handle_line("CTRL: digraph RF { 0; 0 -> 1; }\r\n"),
            Outcome::Redraw
        );
        assert_eq!(
            s.handle_line("CTRL: digraph IR { 1 -> 2 [d=3,a=45]; }"),
            Outcome::Redraw
        );
        let t = s.topology().unwrap();
        assert_eq!(t.nodes.len(), 3);
        assert!(t.edge("0", "1").unwrap().flags.rflink);
        assert!(t.edge("1", "2").unwrap().flags.irlink);
        assert_eq!(s.revision(), 2);
        assert_eq!(s.history().count(), 2);
    }

    #[test]
    fn dedup_drops_repeats() {
        let mut s = session(true);
        let line = "CTRL: digraph RF { 0 -> 1; }";
        assert_eq!(s.handle_line(line), Outcome::Redraw);
        assert_eq!(s.handle_line(line), Outcome::Unchanged);
        assert_eq!(s.revision(), 1);

        let mut s = session(false);
        assert_eq!(s.handle_line(line), Outcome::Redraw);
        assert_eq!(s.handle_line(line), Outcome::Redraw);
    }

    #[test]
    fn bad_lines_leave_state_alone() {
        let mut s = session(true);
        assert_eq!(
            s.handle_line("CTRL: fence: 1:1 2:1"),
            Outcome::Rejected(ControlError::FenceBeforeGraph)
        );
        assert!(matches!(
            s.handle_line("CTRL: digraph RF { 0 -> }"),
            Outcome::Rejected(ControlError::BadGraph(_))
        ));
        assert!(matches!(
            s.handle_line("CTRL: digraph XY { 0 -> 1; }"),
            Outcome::Rejected(ControlError::Topology(_))
        ));
        assert!(s.topology().is_none());

        s.handle_line("CTRL: digraph RF { 0 -> 1; }");
        let before = s.topology().cloned();
        assert!(matches!(
            s.handle_line("CTRL: what is this"),
            Outcome::Rejected(ControlError::UnexpectedMessage(_))
        ));
        assert_eq!(s.topology().cloned(), before);
        assert_eq!(s.history().last().unwrap().level, Level::Warn);
    }

    #[test]
    fn fence_updates_edges() {
        let mut s = session(false);
        s.handle_line("CTRL: digraph IR { 1 -> 2; 2 -> 3; }");
        assert_eq!(s.handle_line("CTRL: fence: 1:1 2:2 3:0"), Outcome::Redraw);
        let t = s.topology().unwrap();
        assert!(t.edge("1", "2").unwrap().flags.beam);
        assert!(t.edge("2", "3").unwrap().flags.breached);
    }

    #[test]
    fn history_is_bounded() {
        let mut s = session(false);
        for _ in 0..HISTORY_LEN + 10 {
            s.handle_line("CTRL: nope");
        }
        assert_eq!(s.history().count(), HISTORY_LEN);
    }

    #[test]
    fn blocks_assemble() {
        let mut b = BlockAssembler::new();
        assert_eq!(b.feed("Routes ver 3: 0 <- 0;"), None);
        assert_eq!(b.feed("graph G {\r\n"), None);
        assert_eq!(b.feed("0 -- 1;\r\n"), None);
        assert_eq!(b.feed("}\r\n"), Some("graph G {\n0 -- 1;\n}\n".to_owned()));

        // identical block again: nothing new
        b.feed("graph G {");
        b.feed("0 -- 1;");
        assert_eq!(b.feed("}"), None);

        assert_eq!(
            b.feed("digraph RF { 0 -> 1; }"),
            Some("digraph RF { 0 -> 1; }\n".to_owned())
        );
    }

    #[test]
    fn blocks_close_on_brace_line() {
        let mut b = BlockAssembler::new();
        b.feed("digraph RF {");
        assert_eq!(b.feed(r#"0 [label="{x}"]"#), None);
        assert_eq!(b.feed("0 -> 1; }"), None);
        assert_eq!(
            b.feed("  }"),
            Some("digraph RF {\n0 [label=\"{x}\"]\n0 -> 1; }\n  }\n".to_owned())
        );
    }

    #[test]
    fn block_session_replaces() {
        let mut s = ControlSession::new(StreamMode::Blocks, "CTRL: ", false);
        for line in ["graph G {", "0 -- 1;", "1 -- 2;", "}"] {
            s.handle_line(line);
        }
        assert_eq!(s.topology().unwrap().edges.len(), 2);
        for line in ["graph G {", "3 -- 4;"] {
            assert_eq!(s.handle_line(line), Outcome::Ignored);
        }
        assert_eq!(s.handle_line("}"), Outcome::Redraw);
        let t = s.topology().unwrap();
        assert_eq!(t.edges.len(), 1);
        assert!(t.edge("4", "3").unwrap().flags.rflink);
    }
}
