//! The persistent network graph the monitor draws. Each DOT graph the nodes
//! print describes one aspect of the network (radio links, IR links or node
//! locations); they are folded into a single [Topology] that only ever
//! grows, with per-edge flags recording which aspects currently apply.

use crate::dot::{Attrs, DotGraph};

use log::{debug, warn};
use std::fmt;

/// Which aspect of the network a graph describes, picked by the graph's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// `digraph RF`: links in the radio routing graph
    Rf,
    /// `digraph IR`: IR line-of-sight links between posts
    Ir,
    /// `digraph LOC`: node coordinates and map dimensions
    Loc,
}

impl UpdateKind {
    /// Map a graph name to the update it carries. `G` is what older firmware
    /// called the RF graph.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RF" | "G" => Some(UpdateKind::Rf),
            "IR" => Some(UpdateKind::Ir),
            "LOC" => Some(UpdateKind::Loc),
            _ => None,
        }
    }
}

/// State of one fence section, as reported by the fence master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    /// No beam between the two posts
    None,
    /// The beam is up and unbroken
    Active,
    /// Something crossed the beam
    Breached,
    /// A code this viewer doesn't know
    Unknown(i32),
}

impl From<i32> for SectionStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => SectionStatus::None,
            1 => SectionStatus::Active,
            2 => SectionStatus::Breached,
            other => SectionStatus::Unknown(other),
        }
    }
}

/// One post of the fence and the status of the section from it to the next
/// post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencePost {
    pub node: String,
    pub status: SectionStatus,
}

/// What is currently known about a link. Flags that were never set read as
/// false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeFlags {
    pub rflink: bool,
    pub irlink: bool,
    pub beam: bool,
    pub breached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopoNode {
    pub id: String,
    pub attrs: Attrs,
}

impl TopoNode {
    /// Coordinates from the `x`/`y` attributes, when both are present and
    /// numeric.
    pub fn coords(&self) -> Option<(f64, f64)> {
        let x = self.attrs.get("x")?.parse::<f64>().ok()?;
        let y = self.attrs.get("y")?.parse::<f64>().ok()?;
        Some((x, y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopoEdge {
    pub from: String,
    pub to: String,
    pub flags: EdgeFlags,
    pub attrs: Attrs,
}

/// Errors applying a graph or a fence report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// Returned for a graph whose name is not one of `RF`, `G`, `IR`, `LOC`.
    UnknownGraph(String),
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TopologyError::UnknownGraph(name) => write!(f, "unknown graph kind '{}'", name),
        }
    }
}

impl std::error::Error for TopologyError {}

/// The merged network graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Topology {
    pub directed: bool,
    pub attrs: Attrs,
    /// Half-extent of the map, from the `dim_x`/`dim_y` of the last LOC graph
    pub dim: Option<(f64, f64)>,
    pub nodes: Vec<TopoNode>,
    pub edges: Vec<TopoEdge>,
}

impl Topology {
    /// Seed a topology with a copy of the first graph received.
    pub fn from_graph(graph: &DotGraph) -> Self {
        Topology {
            directed: graph.directed,
            attrs: graph.attrs.clone(),
            dim: None,
            nodes: graph
                .nodes
                .iter()
                .map(|n| TopoNode {
                    id: n.id.clone(),
                    attrs: n.attrs.clone(),
                })
                .collect(),
            edges: graph
                .edges
                .iter()
                .map(|e| TopoEdge {
                    from: e.from.clone(),
                    to: e.to.clone(),
                    flags: EdgeFlags::default(),
                    attrs: e.attrs.clone(),
                })
                .collect(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&TopoNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn edge_index(&self, from: &str, to: &str) -> Option<usize> {
        self.edges.iter().position(|e| {
            (e.from == from && e.to == to) || (!self.directed && e.from == to && e.to == from)
        })
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&TopoEdge> {
        self.edge_index(from, to).map(|i| &self.edges[i])
    }

    /// Add every node and edge of `graph` that isn't in the topology yet.
    /// Nothing is ever removed.
    pub fn sync(&mut self, graph: &DotGraph) {
        for node in &graph.nodes {
            if self.node(&node.id).is_none() {
                debug!("new node {}", node.id);
                self.nodes.push(TopoNode {
                    id: node.id.clone(),
                    attrs: Attrs::new(),
                });
            }
        }

        for edge in &graph.edges {
            match self.edge_index(&edge.from, &edge.to) {
                Some(idx) => self.edges[idx].attrs.extend(edge.attrs.clone()),
                None => {
                    debug!("new edge {} -> {}", edge.from, edge.to);
                    self.edges.push(TopoEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        flags: EdgeFlags::default(),
                        attrs: edge.attrs.clone(),
                    });
                }
            }
        }
    }

    // Sync, then set `flag` on exactly the edges that `graph` has.
    fn update_flag(&mut self, graph: &DotGraph, flag: fn(&mut EdgeFlags) -> &mut bool) {
        self.sync(graph);

        for edge in self.edges.iter_mut() {
            *flag(&mut edge.flags) = false;
        }
        for edge in &graph.edges {
            if let Some(idx) = self.edge_index(&edge.from, &edge.to) {
                *flag(&mut self.edges[idx].flags) = true;
            }
        }
    }

    /// Fold in a radio topology graph.
    pub fn update_rf(&mut self, graph: &DotGraph) {
        self.update_flag(graph, rflink_of);
    }

    /// Fold in an IR topology graph.
    pub fn update_ir(&mut self, graph: &DotGraph) {
        self.update_flag(graph, irlink_of);
    }

    /// Fold in a localization graph: the map dimensions and node coordinates
    /// are replaced by the ones in `graph`.
    pub fn update_loc(&mut self, graph: &DotGraph) {
        self.sync(graph);

        for key in ["dim_x", "dim_y"] {
            match graph.attrs.get(key) {
                Some(val) => {
                    self.attrs.insert(key.to_owned(), val.clone());
                }
                None => {
                    self.attrs.remove(key);
                }
            }
        }
        self.dim = dims_of(&self.attrs);
        if self.dim.is_none() {
            warn!("localization graph without usable dim_x/dim_y");
        }

        for node in self.nodes.iter_mut() {
            node.attrs.remove("x");
            node.attrs.remove("y");
        }

        for new in &graph.nodes {
            match (new.attrs.get("x"), new.attrs.get("y")) {
                (Some(x), Some(y)) => {
                    if let Some(node) = self.nodes.iter_mut().find(|n| n.id == new.id) {
                        node.attrs.insert("x".to_owned(), x.clone());
                        node.attrs.insert("y".to_owned(), y.clone());
                    }
                }
                _ => warn!("new node with no coords: {}", new.id),
            }
        }
    }

    /// Fold in `graph` according to its name.
    pub fn apply(&mut self, graph: &DotGraph) -> Result<UpdateKind, TopologyError> {
        let kind = UpdateKind::from_name(graph.name())
            .ok_or_else(|| TopologyError::UnknownGraph(graph.name().to_owned()))?;
        match kind {
            UpdateKind::Rf => self.update_rf(graph),
            UpdateKind::Ir => self.update_ir(graph),
            UpdateKind::Loc => self.update_loc(graph),
        }
        Ok(kind)
    }

    /// Record the state of the fence. Every beam and breach is cleared, then
    /// each section `posts[i] -> posts[i + 1]` is marked by `posts[i]`'s
    /// status. Sections between posts that have no edge are skipped. Returns
    /// the number of sections marked.
    pub fn apply_fence(&mut self, posts: &[FencePost]) -> usize {
        for edge in self.edges.iter_mut() {
            edge.flags.beam = false;
            edge.flags.breached = false;
        }

        let mut marked = 0;
        for pair in posts.windows(2) {
            let (out_post, in_post) = (&pair[0], &pair[1]);
            let Some(idx) = self.edge_index(&out_post.node, &in_post.node) else {
                warn!(
                    "fence section {} -> {} has no edge in the graph",
                    out_post.node, in_post.node
                );
                continue;
            };

            let flags = &mut self.edges[idx].flags;
            match out_post.status {
                SectionStatus::None => flags.beam = false,
                SectionStatus::Active => flags.beam = true,
                SectionStatus::Breached => flags.breached = true,
                SectionStatus::Unknown(code) => {
                    debug!("section {} -> {}: status {}", out_post.node, in_post.node, code)
                }
            }
            marked += 1;
        }
        marked
    }

    /// Throw the current state away and show `graph` as it is, every edge
    /// being a radio link.
    pub fn replace_with(&mut self, graph: &DotGraph) {
        *self = Topology::from_graph(graph);
        for edge in self.edges.iter_mut() {
            edge.flags.rflink = true;
        }
    }
}

fn rflink_of(flags: &mut EdgeFlags) -> &mut bool {
    &mut flags.rflink
}

fn irlink_of(flags: &mut EdgeFlags) -> &mut bool {
    &mut flags.irlink
}

fn dims_of(attrs: &Attrs) -> Option<(f64, f64)> {
    let dx = attrs.get("dim_x")?.parse::<f64>().ok()?;
    let dy = attrs.get("dim_y")?.parse::<f64>().ok()?;
    Some((dx, dy))
}
