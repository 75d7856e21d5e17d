use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tstack_backend::{BinaryOp, CpuBinary, DispatchPath, ElementWiseReduce};
use tstack_core::{
    DType, Device, DynamicMemoryController, MemoryConfig, Prototype, Tensor, TsError,
};

fn host() -> DynamicMemoryController {
    DynamicMemoryController::new(Device::cpu())
}

fn random(rng: &mut StdRng, dims: &[usize]) -> Tensor {
    let count: usize = dims.iter().product();
    let data: Vec<f32> = (0..count).map(|_| rng.gen_range(-4.0..4.0)).collect();
    Tensor::from_slice(&data, dims).unwrap()
}

/// Index-by-index evaluation used as the expected result.
fn naive(op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> (Vec<usize>, Vec<f32>) {
    let rank = lhs.dims().max(rhs.dims());
    let pad = |dims: &[usize]| {
        let mut padded = vec![1; rank - dims.len()];
        padded.extend_from_slice(dims);
        padded
    };
    let (l, r) = (pad(lhs.sizes()), pad(rhs.sizes()));
    let out: Vec<usize> = l.iter().zip(&r).map(|(&a, &b)| a.max(b)).collect();
    let (a, b) = (lhs.to_vec::<f32>().unwrap(), rhs.to_vec::<f32>().unwrap());

    let offset = |coords: &[usize], dims: &[usize]| {
        coords
            .iter()
            .zip(dims)
            .fold(0, |acc, (&c, &d)| acc * d + if d == 1 { 0 } else { c })
    };
    let count: usize = out.iter().product();
    let mut values = Vec::with_capacity(count);
    for flat in 0..count {
        let mut coords = vec![0; rank];
        let mut rest = flat;
        for axis in (0..rank).rev() {
            coords[axis] = rest % out[axis];
            rest /= out[axis];
        }
        let (x, y) = (a[offset(&coords, &l)], b[offset(&coords, &r)]);
        values.push(match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
        });
    }
    (out, values)
}

#[test]
fn every_path_matches_naive_evaluation() {
    let cases: [(&[usize], &[usize], DispatchPath); 7] = [
        (&[2, 3, 4], &[2, 3, 4], DispatchPath::SameShape),
        (&[2, 3, 4], &[], DispatchPath::Scalar),
        (&[2, 3, 4], &[1, 1], DispatchPath::Scalar),
        (&[2, 3, 4], &[4], DispatchPath::Bias(2)),
        (&[2, 3, 4], &[3, 1], DispatchPath::Bias(1)),
        (&[2, 1, 4], &[3, 1], DispatchPath::Broadcast),
        (&[5, 1, 3], &[1, 2, 3], DispatchPath::Broadcast),
    ];
    let mut rng = StdRng::seed_from_u64(7);
    for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div] {
        for (lhs_dims, rhs_dims, path) in cases {
            let lhs = random(&mut rng, lhs_dims);
            let rhs = random(&mut rng, rhs_dims);
            assert_eq!(tstack_backend::plan(&lhs, &rhs).unwrap().path, path);

            let out = CpuBinary::new(op).run(&lhs, &rhs, &host()).unwrap();
            let (dims, expected) = naive(op, &lhs, &rhs);
            assert_eq!(out.sizes(), dims.as_slice(), "{op:?} {lhs_dims:?} {rhs_dims:?}");
            assert_eq!(out.to_vec::<f32>().unwrap(), expected, "{op:?} {lhs_dims:?} {rhs_dims:?}");
        }
    }
}

#[test]
fn bias_add_over_channels() {
    // NCHW input with a per-channel bias
    let input = Tensor::from_slice(&[0.0f64; 12], [1, 3, 2, 2]).unwrap();
    let bias = Tensor::from_slice(&[1.0f64, 2.0, 3.0], [3, 1, 1]).unwrap();
    let out = CpuBinary::add().run(&input, &bias, &host()).unwrap();
    assert_eq!(out.sizes(), &[1, 3, 2, 2]);
    assert_eq!(
        out.to_vec::<f64>().unwrap(),
        vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0]
    );
}

#[test]
fn integers_use_the_same_paths() {
    let lhs = Tensor::from_slice(&[1i32, 2, 3, 4, 5, 6], [2, 3]).unwrap();
    let rhs = Tensor::from_slice(&[10i32, 20], [2, 1]).unwrap();
    let out = CpuBinary::mul().run(&lhs, &rhs, &host()).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![10, 20, 30, 80, 100, 120]);
}

#[test]
fn incompatible_operands_are_rejected() {
    let a = Tensor::zeros(DType::Float32, [2, 3]).unwrap();
    let b = Tensor::zeros(DType::Float32, [2]).unwrap();
    assert!(matches!(
        CpuBinary::add().run(&a, &b, &host()),
        Err(TsError::ShapeMismatch { .. })
    ));

    let c = Tensor::zeros(DType::Float64, [2, 3]).unwrap();
    assert!(matches!(
        CpuBinary::add().run(&a, &c, &host()),
        Err(TsError::DTypeMismatch { .. })
    ));

    let g = Tensor::on_device(Device::gpu(0), Prototype::new(DType::Float32, [2, 3])).unwrap();
    assert!(matches!(
        CpuBinary::add().run(&g, &g, &host()),
        Err(TsError::DeviceMismatch { .. })
    ));

    let gpu_controller = MemoryConfig::pooled(Device::gpu(0), None).build();
    assert!(matches!(
        CpuBinary::add().run(&a, &a, gpu_controller.as_ref()),
        Err(TsError::DeviceMismatch { .. })
    ));
}

#[test]
fn infer_reports_the_output_prototype() {
    let a = Tensor::zeros(DType::Float32, [4, 1, 3]).unwrap();
    let b = Tensor::zeros(DType::Float32, [2, 1]).unwrap();
    let proto = CpuBinary::sub().infer(&a, &b).unwrap();
    assert_eq!(proto, Prototype::new(DType::Float32, [4, 2, 3]));
}

/// Implements only the general kernel and counts how often it runs.
struct BroadcastOnly {
    calls: AtomicUsize,
}

impl ElementWiseReduce for BroadcastOnly {
    fn name(&self) -> &'static str {
        "broadcast_only"
    }

    fn memory_device(&self) -> Device {
        Device::cpu()
    }

    fn reduce_with_broadcast(&self, lhs: &Tensor, rhs: &Tensor, out: &mut Tensor) -> tstack_core::Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        CpuBinary::add().reduce_with_broadcast(lhs, rhs, out)
    }
}

#[test]
fn specialised_paths_fall_back_to_broadcast() {
    let op = BroadcastOnly {
        calls: AtomicUsize::new(0),
    };
    let lhs = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], [2, 2]).unwrap();
    let operands = [
        Tensor::from_slice(&[1.0f32, 1.0, 1.0, 1.0], [2, 2]).unwrap(),
        Tensor::scalar(1.0f32).unwrap(),
        Tensor::from_slice(&[1.0f32, 1.0], [2]).unwrap(),
    ];
    for rhs in &operands {
        let out = op.run(&lhs, rhs, &host()).unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
    }
    assert_eq!(op.calls.load(Ordering::Relaxed), 3);
}
