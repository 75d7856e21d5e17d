//! Bottom-up, memoized graph rewriting.
//!
//! A [`Zipper`] walks every node reachable from the requested outputs in
//! post-order. Each node is offered to the registered [`ZipperOption`]s in
//! order; the first one that returns a descriptor replaces the node's
//! descriptor. A node is rebuilt when its descriptor was replaced or any of
//! its inputs was rebuilt, otherwise it is kept as is. Results are memoized
//! per call, so shared subgraphs stay shared in the output.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};
use tstack_core::{Device, Result, TsError};

use crate::bubble::Bubble;
use crate::graph::{Graph, NodeId};
use crate::options::default_options;

/// A local rewrite rule.
///
/// Implementations inspect `node` and either return the descriptor it should
/// carry instead or `None` to decline. The node's inputs are never changed by
/// an option.
pub trait ZipperOption: Send + Sync {
    fn name(&self) -> &'static str;

    fn zip(&self, device: &Device, graph: &Graph, node: NodeId) -> Option<Bubble>;
}

/// Counters for one `zip` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZipStats {
    /// Distinct nodes examined.
    pub visited: usize,
    /// Nodes for which an option supplied a descriptor.
    pub matched: usize,
    /// Nodes appended to the graph.
    pub created: usize,
}

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

pub struct Zipper {
    device: Device,
    options: Vec<Arc<dyn ZipperOption>>,
}

impl Zipper {
    /// Zipper for `device` with the built-in options.
    pub fn new(device: Device) -> Self {
        Self::with_options(device, default_options())
    }

    /// Zipper with an explicit option list; earlier options take priority.
    pub fn with_options(device: Device, options: Vec<Arc<dyn ZipperOption>>) -> Self {
        Self { device, options }
    }

    pub fn push_option(&mut self, option: Arc<dyn ZipperOption>) {
        self.options.push(option);
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn options(&self) -> &[Arc<dyn ZipperOption>] {
        &self.options
    }

    /// Rewrites `nodes`, returning their replacements in the same order.
    pub fn zip(&self, graph: Option<&mut Graph>, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
        self.zip_with_stats(graph, nodes).map(|(zipped, _)| zipped)
    }

    pub fn zip_with_stats(
        &self,
        graph: Option<&mut Graph>,
        nodes: &[NodeId],
    ) -> Result<(Vec<NodeId>, ZipStats)> {
        let graph = graph.ok_or(TsError::ContextMissing("Graph"))?;
        if let Some(bad) = nodes.iter().find(|id| !graph.contains(**id)) {
            return Err(TsError::OutOfRange {
                index: bad.index(),
                len: graph.len(),
            });
        }

        let mut stats = ZipStats::default();
        let mut memo: HashMap<NodeId, NodeId> = HashMap::new();
        let mut pending: HashMap<NodeId, Option<Bubble>> = HashMap::new();
        let mut stack: Vec<Step> = nodes.iter().rev().map(|&id| Step::Enter(id)).collect();

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    if memo.contains_key(&id) || pending.contains_key(&id) {
                        continue;
                    }
                    stats.visited += 1;
                    let candidate = self.candidate(graph, id);
                    if candidate.is_some() {
                        stats.matched += 1;
                    }
                    pending.insert(id, candidate);
                    stack.push(Step::Exit(id));
                    for &input in graph.inputs(id).iter().rev() {
                        stack.push(Step::Enter(input));
                    }
                }
                Step::Exit(id) => {
                    let candidate = pending.remove(&id).flatten();
                    let original = graph.inputs(id);
                    let inputs: Vec<NodeId> = original
                        .iter()
                        .map(|input| memo.get(input).copied().unwrap_or(*input))
                        .collect();
                    let rewired = inputs.as_slice() != original;

                    let zipped = if candidate.is_some() || rewired {
                        let bubble = candidate.unwrap_or_else(|| graph.bubble(id).clone());
                        let created = graph.make(bubble, &inputs)?;
                        stats.created += 1;
                        trace!(from = %id, to = %created, op = graph.bubble(created).op(), "node rebuilt");
                        created
                    } else {
                        id
                    };
                    memo.insert(id, zipped);
                }
            }
        }

        let zipped = nodes
            .iter()
            .map(|id| memo.get(id).copied().unwrap_or(*id))
            .collect();
        debug!(
            device = %self.device,
            visited = stats.visited,
            matched = stats.matched,
            created = stats.created,
            "zip finished"
        );
        Ok((zipped, stats))
    }

    fn candidate(&self, graph: &Graph, id: NodeId) -> Option<Bubble> {
        self.options.iter().find_map(|option| {
            let bubble = option.zip(&self.device, graph, id)?;
            trace!(
                option = option.name(),
                node = %id,
                from = graph.bubble(id).op(),
                to = bubble.op(),
                "option matched"
            );
            Some(bubble)
        })
    }
}
