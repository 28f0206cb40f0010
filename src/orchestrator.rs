//! Orchestrator: runs registered stages in dependency order for a single
//! path, streaming progress and honouring cooperative cancellation.
//!
//! The topological order is computed once at preparation time from a
//! petgraph stage graph, with ties broken by registration order so the
//! schedule is stable. Within a path, stages run sequentially; parallelism
//! lives in the Monte Carlo fan-out. A failed stage aborts the remaining
//! stages, but the partial context and per-stage timings survive.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::config::Config;
use crate::context::{RunStatus, SimulationContext};
use crate::error::SimError;
use crate::events::{EventKind, EventSink, ProgressReporter, SimEvent};
use crate::tls::TlsCatalogue;

/// Shared immutable inputs every stage can read.
pub struct StageEnv<'a> {
    pub config: &'a Config,
    pub tls: &'a TlsCatalogue,
}

/// One pipeline stage. Implementations write only their designated
/// context field, check the cancellation token between inner loops, and
/// report monotonically increasing progress under their own name.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn deps(&self) -> &'static [&'static str];
    fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &crate::events::CancelToken,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), SimError>;
}

pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
    order: Vec<usize>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Orchestrator {
            stages: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.order.iter().map(|&i| self.stages[i].name()).collect()
    }

    /// Build the stage graph and compute the execution order. Unknown
    /// dependencies and cycles are programmer errors.
    pub fn prepare(&mut self) -> Result<(), SimError> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut by_name: HashMap<&'static str, NodeIndex> = HashMap::new();

        for (idx, stage) in self.stages.iter().enumerate() {
            if by_name.contains_key(stage.name()) {
                return Err(SimError::Internal(format!(
                    "duplicate stage `{}`",
                    stage.name()
                )));
            }
            let node = graph.add_node(idx);
            by_name.insert(stage.name(), node);
        }

        for stage in &self.stages {
            let to = by_name[stage.name()];
            for dep in stage.deps() {
                let from = *by_name.get(dep).ok_or_else(|| {
                    SimError::Internal(format!(
                        "stage `{}` depends on unknown stage `{dep}`",
                        stage.name()
                    ))
                })?;
                graph.add_edge(from, to, ());
            }
        }

        // Kahn's algorithm with a min-heap over registration indices: the
        // tie-break is registration order, independent of hash iteration.
        let mut indegree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|n| (n, graph.neighbors_directed(n, petgraph::Direction::Incoming).count()))
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| Reverse(graph[n]))
            .collect();
        let node_of: HashMap<usize, NodeIndex> =
            graph.node_indices().map(|n| (graph[n], n)).collect();

        let mut order = Vec::with_capacity(self.stages.len());
        while let Some(Reverse(stage_idx)) = ready.pop() {
            order.push(stage_idx);
            let node = node_of[&stage_idx];
            for next in graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
                let d = indegree.get_mut(&next).expect("node in degree map");
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse(graph[next]));
                }
            }
        }

        if order.len() != self.stages.len() {
            return Err(SimError::Internal(
                "stage graph contains a cycle".to_string(),
            ));
        }
        self.order = order;
        Ok(())
    }

    /// Execute the prepared schedule against one context. Returns how the
    /// path ended; the context always comes back with whatever completed.
    pub fn run(
        &self,
        env: &StageEnv<'_>,
        ctx: &mut SimulationContext,
        token: &crate::events::CancelToken,
        sink: &dyn EventSink,
    ) -> RunStatus {
        for &idx in &self.order {
            let stage = &self.stages[idx];
            let name = stage.name();

            if token.is_cancelled() {
                return RunStatus::Cancelled { stage: name };
            }

            sink.emit(SimEvent {
                run_id: ctx.run_id.clone(),
                kind: EventKind::ModuleStarted { module: name },
            });

            let progress = ProgressReporter::new(sink, ctx.run_id.clone(), name);
            let started = Instant::now();
            let result = stage.run(env, ctx, token, &progress);
            let elapsed = started.elapsed();
            let millis = elapsed.as_secs_f64() * 1000.0;

            match result {
                Ok(()) => {
                    ctx.record_timing(name, millis);
                    ctx.completed_stages.push(name);
                    sink.emit(SimEvent {
                        run_id: ctx.run_id.clone(),
                        kind: EventKind::ModuleCompleted {
                            module: name,
                            execution_time_seconds: elapsed.as_secs_f64(),
                        },
                    });
                }
                Err(SimError::Cancelled) => {
                    ctx.record_timing(name, millis);
                    return RunStatus::Cancelled { stage: name };
                }
                Err(error) => {
                    ctx.record_timing(name, millis);
                    // Cancellation wins over an error that lands after it.
                    if token.is_cancelled() {
                        return RunStatus::Cancelled { stage: name };
                    }
                    sink.emit(SimEvent {
                        run_id: ctx.run_id.clone(),
                        kind: EventKind::Error {
                            error: error.to_string(),
                            module: Some(name),
                        },
                    });
                    return RunStatus::Failed {
                        stage: name,
                        error: error.to_string(),
                    };
                }
            }
        }

        RunStatus::Completed
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Orchestrator::new()
    }
}
