//! A parser for the subset of the DOT graph language the nodes print:
//!
//! ```text
//! digraph LOC { dim_x=5; dim_y=5; 1 [x=0,y=0]; 2 [x=3,y=-1]; 1 -> 2 [d=3,a=90]; }
//! ```
//!
//! Supported are node, edge (including chains like `a -> b -> c`), attribute
//! (`graph`/`node`/`edge [...]`) and `ID = ID` statements. Identifiers can be
//! bare words, numerals or double-quoted strings. Subgraphs, ports and HTML
//! strings are not.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, opt, peek, recognize, value},
    error::Error,
    multi::{fold_many0, many0, many0_count, many1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    Finish, IResult,
};

use std::{collections::BTreeMap, fmt::Write, str::FromStr};

/// Attributes of a graph, node or edge.
pub type Attrs = BTreeMap<String, String>;

/// A node and its attributes, in the order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub id: String,
    pub attrs: Attrs,
}

/// One edge; `a -> b -> c` yields two of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEdge {
    pub from: String,
    pub to: String,
    pub attrs: Attrs,
}

/// A parsed DOT graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DotGraph {
    pub strict: bool,
    pub directed: bool,
    pub name: Option<String>,
    pub attrs: Attrs,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<DotEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrTarget {
    Graph,
    Node,
    Edge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stmt {
    Attr(AttrTarget, Attrs),
    Assign(String, String),
    Edge(Vec<String>, Attrs),
    Node(String, Attrs),
}

fn ws(s: &str) -> IResult<&str, &str> {
    multispace0(s)
}

fn parse_bare_id(s: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_")))),
        )),
        |id: &str| id.to_owned(),
    )(s)
}

fn parse_numeral(s: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            opt(char('-')),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
        )),
        |id: &str| id.to_owned(),
    )(s)
}

// Only `\"` is an escape; any other backslash is kept as it is, so label
// escapes like `\l` and Windows paths survive.
fn parse_quoted_id(s: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((value("\"", tag("\\\"")), is_not("\\\""), tag("\\"))),
            String::new,
            |mut acc, piece: &str| {
                acc.push_str(piece);
                acc
            },
        ),
        char('"'),
    )(s)
}

fn parse_id(s: &str) -> IResult<&str, String> {
    alt((parse_quoted_id, parse_numeral, parse_bare_id))(s)
}

fn parse_separator(s: &str) -> IResult<&str, ()> {
    value((), tuple((ws, opt(one_of(";,")), ws)))(s)
}

fn parse_attr_pair(s: &str) -> IResult<&str, (String, String)> {
    separated_pair(parse_id, tuple((ws, char('='), ws)), parse_id)(s)
}

fn parse_attr_list(s: &str) -> IResult<&str, Attrs> {
    map(
        many1(terminated(
            delimited(
                pair(char('['), ws),
                many0(terminated(parse_attr_pair, parse_separator)),
                char(']'),
            ),
            ws,
        )),
        |lists| lists.into_iter().flatten().collect(),
    )(s)
}

fn parse_attr_target(s: &str) -> IResult<&str, AttrTarget> {
    terminated(
        alt((
            value(AttrTarget::Graph, tag("graph")),
            value(AttrTarget::Node, tag("node")),
            value(AttrTarget::Edge, tag("edge")),
        )),
        peek(pair(ws, char('['))),
    )(s)
}

fn parse_edge_op(s: &str) -> IResult<&str, &str> {
    delimited(ws, alt((tag("->"), tag("--"))), ws)(s)
}

fn parse_stmt(s: &str) -> IResult<&str, Stmt> {
    alt((
        map(
            separated_pair(parse_attr_target, ws, parse_attr_list),
            |(target, attrs)| Stmt::Attr(target, attrs),
        ),
        map(parse_attr_pair, |(k, v)| Stmt::Assign(k, v)),
        map(
            tuple((
                parse_id,
                many1(preceded(parse_edge_op, parse_id)),
                opt(preceded(ws, parse_attr_list)),
            )),
            |(first, rest, attrs)| {
                let mut chain = vec![first];
                chain.extend(rest);
                Stmt::Edge(chain, attrs.unwrap_or_default())
            },
        ),
        map(
            pair(parse_id, opt(preceded(ws, parse_attr_list))),
            |(id, attrs)| Stmt::Node(id, attrs.unwrap_or_default()),
        ),
    ))(s)
}

fn parse_header(s: &str) -> IResult<&str, (bool, bool, Option<String>)> {
    map(
        tuple((
            preceded(ws, opt(terminated(tag("strict"), ws))),
            alt((value(true, tag("digraph")), value(false, tag("graph")))),
            ws,
            opt(terminated(parse_id, ws)),
        )),
        |(strict, directed, _, name)| (strict.is_some(), directed, name),
    )(s)
}

fn parse_graph(s: &str) -> IResult<&str, DotGraph> {
    map(
        tuple((
            parse_header,
            delimited(
                pair(char('{'), ws),
                many0(terminated(parse_stmt, parse_separator)),
                pair(char('}'), ws),
            ),
        )),
        |((strict, directed, name), stmts)| DotGraph::from_statements(strict, directed, name, stmts),
    )(s)
}

impl DotGraph {
    fn from_statements(
        strict: bool,
        directed: bool,
        name: Option<String>,
        stmts: Vec<Stmt>,
    ) -> Self {
        let mut graph = DotGraph {
            strict,
            directed,
            name,
            ..Default::default()
        };
        let mut node_defaults = Attrs::new();
        let mut edge_defaults = Attrs::new();

        for stmt in stmts {
            match stmt {
                Stmt::Attr(AttrTarget::Graph, attrs) => graph.attrs.extend(attrs),
                Stmt::Attr(AttrTarget::Node, attrs) => node_defaults.extend(attrs),
                Stmt::Attr(AttrTarget::Edge, attrs) => edge_defaults.extend(attrs),
                Stmt::Assign(key, val) => {
                    graph.attrs.insert(key, val);
                }
                Stmt::Node(id, attrs) => {
                    graph.touch_node(&id, &node_defaults).attrs.extend(attrs);
                }
                Stmt::Edge(chain, attrs) => {
                    for id in &chain {
                        graph.touch_node(id, &node_defaults);
                    }
                    for pair in chain.windows(2) {
                        let mut edge_attrs = edge_defaults.clone();
                        edge_attrs.extend(attrs.clone());
                        graph.edges.push(DotEdge {
                            from: pair[0].clone(),
                            to: pair[1].clone(),
                            attrs: edge_attrs,
                        });
                    }
                }
            }
        }

        graph
    }

    // Returns the node called `id`, declaring it with `defaults` first if
    // this is its first appearance.
    fn touch_node(&mut self, id: &str, defaults: &Attrs) -> &mut DotNode {
        let idx = match self.nodes.iter().position(|n| n.id == id) {
            Some(idx) => idx,
            None => {
                self.nodes.push(DotNode {
                    id: id.to_owned(),
                    attrs: defaults.clone(),
                });
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx]
    }

    /// The graph's name, or an empty string for anonymous graphs.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Serialize back to a single line of DOT.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        if self.strict {
            out.push_str("strict ");
        }
        out.push_str(if self.directed { "digraph" } else { "graph" });
        if let Some(name) = &self.name {
            let _ = write!(out, " {}", quote_id(name));
        }
        out.push_str(" { ");
        for (key, val) in &self.attrs {
            let _ = write!(out, "{}={}; ", quote_id(key), quote_id(val));
        }
        for node in &self.nodes {
            let _ = write!(out, "{}{}; ", quote_id(&node.id), format_attrs(&node.attrs));
        }
        let op = if self.directed { "->" } else { "--" };
        for edge in &self.edges {
            let _ = write!(
                out,
                "{} {} {}{}; ",
                quote_id(&edge.from),
                op,
                quote_id(&edge.to),
                format_attrs(&edge.attrs)
            );
        }
        out.push('}');
        out
    }
}

fn quote_id(id: &str) -> String {
    let bare = parse_bare_id(id).map_or(false, |(rest, _)| rest.is_empty());
    let numeral = parse_numeral(id).map_or(false, |(rest, _)| rest.is_empty());
    if bare || numeral {
        id.to_owned()
    } else {
        format!("\"{}\"", id.replace('"', "\\\""))
    }
}

fn format_attrs(attrs: &Attrs) -> String {
    if attrs.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = attrs
        .iter()
        .map(|(k, v)| format!("{}={}", quote_id(k), quote_id(v)))
        .collect();
    format!(" [{}]", pairs.join(","))
}

impl FromStr for DotGraph {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match all_consuming(parse_graph)(s).finish() {
            Ok((_remaining, graph)) => Ok(graph),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}
