use tracing::debug;
use tstack_core::{Device, MemoryController, Prototype, Result, Tensor, TsError};

use crate::broadcast::{plan, DispatchPath};

/// Binary element-wise operator with shape-directed kernel selection.
///
/// Implementors provide the general broadcast kernel; the specialised paths
/// default to it and may be overridden with faster kernels. Every kernel
/// receives operands of one dtype, already on [`memory_device`], with shapes
/// padded to the output rank.
///
/// [`memory_device`]: ElementWiseReduce::memory_device
pub trait ElementWiseReduce: Send + Sync {
    fn name(&self) -> &'static str;

    /// Device whose memory this operator reads and writes. Fixed at
    /// construction.
    fn memory_device(&self) -> Device;

    fn reduce_with_broadcast(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> Result<()>;

    /// `lhs` and `rhs` have the shape of `out`.
    fn reduce_with_same_shape(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> Result<()> {
        self.reduce_with_broadcast(lhs, rhs, out)
    }

    /// `rhs` has a single non-unit extent, at `dim`, equal to `lhs[dim]`.
    fn reduce_with_bias(
        &self,
        lhs: &Tensor,
        rhs: &Tensor,
        out: &mut Tensor,
        _dim: usize,
    ) -> Result<()> {
        self.reduce_with_broadcast(lhs, rhs, out)
    }

    /// `rhs` holds one element.
    fn reduce_with_scalar(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> Result<()> {
        self.reduce_with_broadcast(lhs, rhs, out)
    }

    fn infer(&self, lhs: &Tensor, rhs: &Tensor) -> Result<Prototype> {
        let plan = plan(lhs, rhs)?;
        Ok(Prototype::new(lhs.dtype(), plan.out))
    }

    /// Allocates the output from `controller` and runs the selected kernel.
    fn run(
        &self,
        lhs: &Tensor,
        rhs: &Tensor,
        controller: &dyn MemoryController,
    ) -> Result<Tensor> {
        let device = self.memory_device();
        for got in [lhs.device(), rhs.device(), controller.device()] {
            if got != device {
                return Err(TsError::DeviceMismatch {
                    expected: device,
                    got,
                });
            }
        }

        let plan = plan(lhs, rhs)?;
        debug!(
            op = self.name(),
            path = ?plan.path,
            lhs = %plan.lhs,
            rhs = %plan.rhs,
            out = %plan.out,
            "element-wise dispatch"
        );
        let mut out = Tensor::new(controller, Prototype::new(lhs.dtype(), plan.out))?;
        let lhs = lhs.reshape(plan.lhs)?;
        let rhs = rhs.reshape(plan.rhs)?;

        match plan.path {
            DispatchPath::SameShape => self.reduce_with_same_shape(&lhs, &rhs, &mut out)?,
            DispatchPath::Scalar => self.reduce_with_scalar(&lhs, &rhs, &mut out)?,
            DispatchPath::Bias(dim) => self.reduce_with_bias(&lhs, &rhs, &mut out, dim)?,
            DispatchPath::Broadcast => self.reduce_with_broadcast(&lhs, &rhs, &mut out)?,
        }
        Ok(out)
    }
}
