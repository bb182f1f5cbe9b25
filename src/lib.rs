//! RfLab is the host-side tooling for a sensor-network lab course built on
//! Nano-RK motes. It covers two kinds of work:
//!
//! - Turning what the motes print over their UART into something you can
//!   reason about: [trace] lines become CSV tables ([convert]), tables become
//!   statistics ([stats]) and figures ([figure]).
//! - Watching the network live. The fence master prints the radio topology,
//!   the IR topology, node locations and the state of the IR fence as DOT
//!   graphs and `fence:` reports ([control]). These are merged into one
//!   persistent [topology], laid out ([layout]) and redrawn in the terminal
//!   ([gui]) as they arrive over a serial [link].
//!
//! Two binaries front this: `rflab` for the offline tools and `monitor` for
//! the live view. [simulate] stands in for the hardware when there is none.

#![warn(missing_docs)]
pub mod args;
pub mod config;
pub mod control;
pub mod convert;
pub mod dot;
pub mod figure;
pub mod gui;
pub mod layout;
pub mod link;
pub mod simulate;
pub mod stats;
pub mod topology;
pub mod trace;
