//! A stand-in for the fence master, for running the monitor without any
//! hardware. It prints the same control lines a real deployment would: RF
//! and IR topologies, node locations and fence reports, with a bit of noise
//! so the picture keeps changing.

use rand::{prelude::*, rngs::StdRng};
use std::{
    collections::VecDeque,
    fmt::Write as _,
    io::{self, Read},
    time::Duration,
};

/// A simulated network of `num_nodes` posts standing on a circle, each
/// within IR range of its two neighbours.
pub struct Simulator {
    rng: StdRng,
    num_nodes: usize,
    dim: u32,
    period: Duration,
    prefix: String,
    step: usize,
    pending: VecDeque<u8>,
}

/// Builder for a [Simulator].
#[derive(Debug, Clone)]
pub struct SimulatorBuilder {
    num_nodes: usize,
    seed: Option<u64>,
    dim: u32,
    period: Duration,
    prefix: String,
}

impl Default for SimulatorBuilder {
    fn default() -> Self {
        Self {
            num_nodes: 5,
            seed: None,
            dim: 10,
            period: Duration::from_millis(500),
            prefix: "CTRL: ".to_owned(),
        }
    }
}

impl SimulatorBuilder {
    pub fn num_nodes(self, num_nodes: usize) -> Self {
        Self { num_nodes, ..self }
    }

    /// Fix the random seed, for repeatable runs.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    /// Half-width of the square map the posts stand on.
    pub fn dim(self, dim: u32) -> Self {
        Self { dim, ..self }
    }

    /// Delay before each line when used as a [Read] source.
    pub fn period(self, period: Duration) -> Self {
        Self { period, ..self }
    }

    pub fn prefix(self, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            ..self
        }
    }

    pub fn build(self) -> Simulator {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Simulator {
            rng,
            num_nodes: self.num_nodes,
            dim: self.dim,
            period: self.period,
            prefix: self.prefix,
            step: 0,
            pending: VecDeque::new(),
        }
    }
}

impl Simulator {
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::default()
    }

    // Post `i` of `n`, on a circle filling most of the map.
    fn post_position(&self, i: usize) -> (i32, i32) {
        let angle = (i as f64 / self.num_nodes as f64) * 2.0 * std::f64::consts::PI;
        let r = self.dim as f64 * 0.8;
        ((angle.cos() * r).round() as i32, (angle.sin() * r).round() as i32)
    }

    fn rf_graph(&mut self) -> String {
        let mut out = String::from("digraph RF { 0; ");
        for u in 0..self.num_nodes {
            for v in 0..self.num_nodes {
                if u != v && self.rng.gen_bool(0.35) {
                    let _ = write!(out, "{} -> {}; ", u, v);
                }
            }
        }
        out.push('}');
        out
    }

    fn ir_graph(&mut self) -> String {
        let mut out = String::from("digraph IR { ");
        for u in 0..self.num_nodes {
            let v = (u + 1) % self.num_nodes;
            if u != v && self.rng.gen_bool(0.9) {
                let dist = self.rng.gen_range(2..6);
                let angle = self.rng.gen_range(0..360);
                let _ = write!(out, "{} -> {} [d={},a={}]; ", u, v, dist, angle);
            }
        }
        out.push('}');
        out
    }

    fn loc_graph(&mut self) -> String {
        let mut out = format!("digraph LOC {{ dim_x={}; dim_y={}; ", self.dim, self.dim);
        for i in 0..self.num_nodes {
            // one post now and then fails to localize
            if self.rng.gen_bool(0.1) {
                continue;
            }
            let (x, y) = self.post_position(i);
            let _ = write!(out, "{}  [x={},y={}]; ", i, x, y);
        }
        for u in 0..self.num_nodes {
            let v = (u + 1) % self.num_nodes;
            if u != v {
                let _ = write!(out, "{} -> {} [d=3,a=0]; ", u, v);
            }
        }
        out.push('}');
        out
    }

    fn fence(&mut self) -> String {
        let mut out = String::from("fence: ");
        for i in 0..self.num_nodes {
            let status = match self.rng.gen_range(0..10) {
                0 => 2,
                1 => 0,
                _ => 1,
            };
            let _ = write!(out, "{}:{} ", i, status);
        }
        out
    }

    /// The next line the fence master would print, without the line ending.
    pub fn next_line(&mut self) -> String {
        // the real device interleaves debug chatter with control lines
        if self.rng.gen_bool(0.2) {
            let node = self.rng.gen_range(0..self.num_nodes.max(1));
            let rssi = self.rng.gen_range(30..90);
            return format!("rx from {}: rssi -{}", node, rssi);
        }

        let body = match self.step % 4 {
            0 => self.rf_graph(),
            1 => self.ir_graph(),
            2 => self.loc_graph(),
            _ => self.fence(),
        };
        self.step += 1;
        format!("{}{}", self.prefix, body)
    }
}

// Lets the simulator stand in for a serial device: each line shows up after
// one period.
impl Read for Simulator {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            spin_sleep::sleep(self.period);
            let line = self.next_line();
            self.pending.extend(line.bytes());
            self.pending.extend(b"\r\n");
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
