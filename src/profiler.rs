//! Optional frame profiling hooks.
//!
//! The graph reports a marker when each [`GraphStep`] begins and when each
//! used pass starts executing. Install a profiler with
//! [`FrameGraph::set_profiler`](crate::graph::FrameGraph::set_profiler).

use crate::graph::GraphStep;

/// Receiver of frame-graph step markers.
pub trait Profiler {
    /// A graph-wide step begins.
    fn graph_step(&mut self, step: GraphStep);

    /// A pass begins its execute body.
    fn pass_step(&mut self, pass_name: &str);
}

/// Routes step markers to `log::trace!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProfiler;

impl Profiler for LogProfiler {
    fn graph_step(&mut self, step: GraphStep) {
        log::trace!("[FrameGraph] step {}", step.name());
    }

    fn pass_step(&mut self, pass_name: &str) {
        log::trace!("[FrameGraph] pass {pass_name}");
    }
}
