//! Where to draw each node. Nodes with coordinates go where they say they
//! are; the rest are arranged around them.

use crate::topology::Topology;

use std::f64::consts::PI;

/// Bounds used when nothing is located and everything sits on the unit
/// circle.
pub const CIRCULAR_BOUNDS: [f64; 2] = [-1.25, 1.25];

/// A node and the point it is drawn at.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Whether the position came from the node's own coordinates
    pub located: bool,
}

/// Positions of all nodes, and the part of the plane they should be shown in.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub placed: Vec<PlacedNode>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl Layout {
    /// Position of node `id`.
    pub fn position(&self, id: &str) -> Option<(f64, f64)> {
        self.placed
            .iter()
            .find(|p| p.id == id)
            .map(|p| (p.x, p.y))
    }
}

/// `n` points evenly spaced on the unit circle, the first at angle zero. A
/// lone point sits at the origin.
pub fn circular(n: usize) -> Vec<(f64, f64)> {
    if n == 1 {
        return vec![(0.0, 0.0)];
    }
    (0..n)
        .map(|i| (i as f64 / n as f64) * 2.0 * PI)
        .map(|angle| (angle.cos(), angle.sin()))
        .collect()
}

// Box around the located points, padded so nodes on the edge stay visible.
fn padded_bounds(points: &[(f64, f64)]) -> ([f64; 2], [f64; 2]) {
    let pad = |lo: f64, hi: f64| {
        let margin = ((hi - lo) * 0.1).max(1.0);
        [lo - margin, hi + margin]
    };
    let (mut x_lo, mut x_hi) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_lo, mut y_hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        x_lo = x_lo.min(x);
        x_hi = x_hi.max(x);
        y_lo = y_lo.min(y);
        y_hi = y_hi.max(y);
    }
    (pad(x_lo, x_hi), pad(y_lo, y_hi))
}

/// Lay out `topology`.
///
/// - If no node has coordinates, all of them go on a circle.
/// - Otherwise located nodes go to their coordinates, the view spans
///   `(-dim_x, dim_x)` by `(-dim_y, dim_y)` (or the located nodes' bounding
///   box when the map size is unknown), and unlocated nodes line up across
///   the vertical middle of the view.
pub fn layout(topology: &Topology) -> Layout {
    let mut located = Vec::new();
    let mut unlocated = Vec::new();
    for node in &topology.nodes {
        match node.coords() {
            Some((x, y)) => located.push(PlacedNode {
                id: node.id.clone(),
                x,
                y,
                located: true,
            }),
            None => unlocated.push(node.id.clone()),
        }
    }

    if located.is_empty() {
        let placed = unlocated
            .into_iter()
            .zip(circular(topology.nodes.len()))
            .map(|(id, (x, y))| PlacedNode {
                id,
                x,
                y,
                located: false,
            })
            .collect();
        return Layout {
            placed,
            x_bounds: CIRCULAR_BOUNDS,
            y_bounds: CIRCULAR_BOUNDS,
        };
    }

    let (x_bounds, y_bounds) = match topology.dim {
        Some((dx, dy)) => ([-dx, dx], [-dy, dy]),
        None => {
            let points: Vec<(f64, f64)> = located.iter().map(|p| (p.x, p.y)).collect();
            padded_bounds(&points)
        }
    };

    let x_span = x_bounds[0].abs() + x_bounds[1].abs();
    let x_step = x_span / (unlocated.len() + 2) as f64;
    let y_mid = (y_bounds[0] + y_bounds[1]) / 2.0;

    let mut placed = located;
    placed.extend(unlocated.into_iter().enumerate().map(|(i, id)| PlacedNode {
        id,
        x: x_bounds[0] + x_step * (i + 1) as f64,
        y: y_mid,
        located: false,
    }));

    Layout {
        placed,
        x_bounds,
        y_bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot::DotGraph;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn topology(first: &str, rest: &[&str]) -> Topology {
        let g: DotGraph = first.parse().unwrap();
        let mut t = Topology::from_graph(&g);
        t.apply(&g).unwrap();
        for s in rest {
            t.apply(&s.parse().unwrap()).unwrap();
        }
        t
    }

    #[test]
    fn circle_points() {
        let pts = circular(4);
        let expected = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        for ((x, y), (ex, ey)) in pts.iter().zip(expected) {
            assert!(close(*x, ex) && close(*y, ey));
        }
        assert_eq!(circular(1), vec![(0.0, 0.0)]);
        assert!(circular(0).is_empty());
    }

    #[test]
    fn nothing_located() {
        let t = topology("digraph RF { 0 -> 1; 1 -> 2; }", &[]);
        let l = layout(&t);
        assert_eq!(l.placed.len(), 3);
        assert!(l.placed.iter().all(|p| !p.located));
        assert_eq!(l.x_bounds, CIRCULAR_BOUNDS);
        let (x, y) = l.position("0").unwrap();
        assert!(close(x, 1.0) && close(y, 0.0));
    }

    #[test]
    fn mixed_with_dims() {
        let t = topology(
            "digraph RF { 0 -> 1; 1 -> 2; 2 -> 3; }",
            &["digraph LOC { dim_x=6; dim_y=4; 0 [x=1,y=2]; 1 [x=-2,y=3]; }"],
        );
        let l = layout(&t);
        assert_eq!(l.x_bounds, [-6.0, 6.0]);
        assert_eq!(l.y_bounds, [-4.0, 4.0]);
        assert_eq!(l.position("0"), Some((1.0, 2.0)));
        assert_eq!(l.position("1"), Some((-2.0, 3.0)));

        // two unlocated nodes: step 12 / 4 = 3, starting one step in
        assert_eq!(l.position("2"), Some((-3.0, 0.0)));
        assert_eq!(l.position("3"), Some((0.0, 0.0)));
    }

    #[test]
    fn located_without_dims() {
        let mut t = topology("digraph RF { 0 -> 1; }", &[]);
        t.nodes[0].attrs.insert("x".into(), "0".into());
        t.nodes[0].attrs.insert("y".into(), "0".into());
        t.nodes[1].attrs.insert("x".into(), "20".into());
        t.nodes[1].attrs.insert("y".into(), "5".into());
        let l = layout(&t);
        assert_eq!(l.x_bounds, [-2.0, 22.0]);
        assert_eq!(l.y_bounds, [-1.0, 6.0]);
        assert!(l.placed.iter().all(|p| p.located));
    }
}
