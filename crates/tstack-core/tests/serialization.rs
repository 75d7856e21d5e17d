use proptest::prelude::*;

use tstack_core::{DType, Device, PoolMemoryController, Prototype, Tensor, TsError};

const DTYPES: [DType; 10] = [
    DType::Void,
    DType::Int8,
    DType::UInt8,
    DType::Int16,
    DType::Int32,
    DType::Int64,
    DType::Float16,
    DType::Float32,
    DType::Float64,
    DType::Unknown128,
];

fn field() -> impl Strategy<Value = (Prototype, Vec<u8>, bool)> {
    (
        prop::sample::select(DTYPES.to_vec()),
        prop::collection::vec(0usize..5, 0..=3),
        any::<bool>(),
    )
        .prop_flat_map(|(dtype, dims, on_gpu)| {
            let proto = Prototype::new(dtype, dims);
            let bytes = proto.bytes();
            (
                Just(proto),
                prop::collection::vec(any::<u8>(), bytes),
                Just(on_gpu),
            )
        })
}

fn build(fields: &[(Prototype, Vec<u8>, bool)]) -> Tensor {
    let parts = fields
        .iter()
        .map(|(proto, bytes, on_gpu)| {
            let device = if *on_gpu { Device::gpu(0) } else { Device::cpu() };
            let t = Tensor::on_device(device, proto.clone()).unwrap();
            t.memory().data_mut().copy_from_slice(bytes);
            t
        })
        .collect();
    Tensor::pack(parts)
}

proptest! {
    #[test]
    fn serialize_then_externalize_reproduces_fields(
        fields in prop::collection::vec(field(), 1..=4)
    ) {
        let original = build(&fields);
        let bytes = original.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), original.serialized_size());

        let restored = Tensor::from_bytes(&bytes).unwrap();
        prop_assert_eq!(restored.fields_count(), fields.len());
        for (i, (proto, data, _)) in fields.iter().enumerate() {
            let field = restored.field(i).unwrap();
            prop_assert_eq!(field.proto(), proto);
            prop_assert_eq!(field.device(), Device::cpu());
            let got = field.memory().data();
            prop_assert_eq!(&*got, data.as_slice());
        }
    }
}

#[test]
fn externalize_into_pool_reuses_buffers() {
    let pool = PoolMemoryController::new(Device::cpu());
    let t = Tensor::from_slice(&[1.0f32; 16], [4, 4]).unwrap();
    let bytes = t.to_bytes().unwrap();

    for _ in 0..3 {
        let restored = Tensor::externalize(&mut bytes.as_slice(), Some(&pool)).unwrap();
        assert_eq!(restored.to_vec::<f32>().unwrap(), vec![1.0; 16]);
    }
    let stats = pool.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}

#[test]
fn stream_written_to_a_file_reads_back() {
    let path = std::env::temp_dir().join(format!("tstack_tensor_{}.bin", std::process::id()));
    let t = Tensor::pack(vec![
        Tensor::from_slice(&[3i32, 1, 4, 1, 5, 9], [2, 3]).unwrap(),
        Tensor::scalar(2.5f64).unwrap(),
    ]);
    {
        let mut file = std::fs::File::create(&path).unwrap();
        t.serialize(&mut file).unwrap();
    }
    let mut file = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
    let restored = Tensor::externalize(&mut file, None).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(restored.fields_count(), 2);
    assert_eq!(restored.to_vec::<i32>().unwrap(), vec![3, 1, 4, 1, 5, 9]);
    assert_eq!(restored.field(1).unwrap().to_vec::<f64>().unwrap(), vec![2.5]);
}

#[test]
fn huge_extents_do_not_allocate_blindly() {
    // one float32 field of shape [u32::MAX, u32::MAX, u32::MAX]
    let mut bytes = vec![1, 0, 0, 0, DType::Float32.code(), 3, 0, 0, 0];
    for _ in 0..3 {
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    }
    let err = Tensor::from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err,
        TsError::CorruptFormat(_) | TsError::AllocationFailure { .. }
    ));
}

#[test]
fn max_sized_field_after_a_small_one_fails_cleanly_in_a_bounded_pool() {
    // field 0: float32 scalar; field 1: uint8 whose extents multiply to 2^64 - 1
    let mut bytes = vec![2, 0, 0, 0, DType::Float32.code(), 0, 0, 0, 0];
    bytes.extend_from_slice(&1.5f32.to_le_bytes());
    bytes.push(DType::UInt8.code());
    let extents: [u32; 7] = [3, 5, 17, 257, 65537, 641, 6700417];
    bytes.extend_from_slice(&(extents.len() as u32).to_le_bytes());
    for extent in extents {
        bytes.extend_from_slice(&extent.to_le_bytes());
    }

    let pool = PoolMemoryController::with_limit(Device::cpu(), Some(1 << 20));
    let err = Tensor::externalize(&mut bytes.as_slice(), Some(&pool)).unwrap_err();
    assert!(matches!(
        err,
        TsError::AllocationFailure { .. } | TsError::CorruptFormat(_)
    ));
    assert_eq!(pool.stats().live_bytes, 0);
}
