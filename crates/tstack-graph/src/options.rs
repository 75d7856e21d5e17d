//! Built-in rewrite rules.

use std::sync::Arc;

use tstack_core::Device;

use crate::bubble::{op, param, Bubble};
use crate::graph::{Graph, NodeId};
use crate::zipper::ZipperOption;

pub const CONV2D: &str = "conv2d";
pub const CONV2D_WINOGRAD: &str = "conv2d_winograd";

/// Options every [`crate::Zipper::new`] starts with, in priority order.
pub fn default_options() -> Vec<Arc<dyn ZipperOption>> {
    vec![Arc::new(Conv2dWinogradOption)]
}

/// Switches a CPU `conv2d` with a constant 3x3 kernel, unit stride and unit
/// dilation to the Winograd kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conv2dWinogradOption;

impl Conv2dWinogradOption {
    fn all_ones(bubble: &Bubble, key: &str) -> bool {
        match bubble.get_i32s(key) {
            Ok(Some(values)) => values.iter().all(|&v| v == 1),
            Ok(None) => true,
            Err(_) => false,
        }
    }
}

impl ZipperOption for Conv2dWinogradOption {
    fn name(&self) -> &'static str {
        "conv2d_winograd"
    }

    fn zip(&self, device: &Device, graph: &Graph, node: NodeId) -> Option<Bubble> {
        if !device.is_cpu() {
            return None;
        }
        let bubble = graph.bubble(node);
        if bubble.op() != CONV2D {
            return None;
        }
        let weight = graph.bubble(*graph.inputs(node).get(1)?);
        if weight.op() != op::CONST {
            return None;
        }
        match weight.get(param::VALUE)?.sizes() {
            [_, _, 3, 3] => {}
            _ => return None,
        }
        if !Self::all_ones(bubble, "stride") || !Self::all_ones(bubble, "dilation") {
            return None;
        }
        Some(bubble.with_op(CONV2D_WINOGRAD))
    }
}
