use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::element::Element;
use crate::{memcpy_bytes, DType, Device, Memory, MemoryController, Prototype, Result, Shape, TsError};

#[derive(Clone, Default)]
struct Field {
    proto: Prototype,
    memory: Memory,
}

/// One or more (prototype, memory) fields.
///
/// Field 0 is the primary value; further fields carry the auxiliary outputs
/// of multi-output operators. `Clone` aliases every field's memory; use
/// [`Tensor::clone_with`] for independent storage.
///
/// `Tensor::default()` is the VOID rank-0 "no value". It is not a scalar: a
/// scalar has a non-VOID dtype.
#[derive(Clone)]
pub struct Tensor {
    fields: SmallVec<[Field; 1]>,
}

impl Default for Tensor {
    fn default() -> Self {
        Self {
            fields: smallvec![Field::default()],
        }
    }
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Allocates field-0 memory for `proto` from `controller`.
    pub fn new(controller: &dyn MemoryController, proto: Prototype) -> Result<Self> {
        let memory = controller.alloc(proto.bytes())?;
        Ok(Self::single(proto, memory))
    }

    /// Allocates field-0 memory for `proto` directly on `device`.
    pub fn on_device(device: Device, proto: Prototype) -> Result<Self> {
        let memory = Memory::new(device, proto.bytes())?;
        Ok(Self::single(proto, memory))
    }

    /// Allocates field-0 memory for `proto` on the host.
    pub fn from_proto(proto: Prototype) -> Result<Self> {
        Self::on_device(Device::cpu(), proto)
    }

    /// Host tensor of zeros.
    pub fn zeros(dtype: DType, shape: impl Into<Shape>) -> Result<Self> {
        Self::from_proto(Prototype::new(dtype, shape))
    }

    /// Wraps existing memory without copying.
    pub fn from_memory(memory: Memory, proto: Prototype) -> Result<Self> {
        if memory.size() < proto.bytes() {
            return Err(TsError::InsufficientMemory {
                required: proto.bytes(),
                available: memory.size(),
            });
        }
        Ok(Self::single(proto, memory))
    }

    /// Host tensor holding a copy of `data`.
    pub fn from_slice<T: Element>(data: &[T], shape: impl Into<Shape>) -> Result<Self> {
        let proto = Prototype::new(T::DTYPE, shape);
        if proto.count() != data.len() {
            return Err(TsError::ShapeMismatch {
                expected: proto.sizes().to_vec(),
                got: vec![data.len()],
            });
        }
        let memory = Memory::from_bytes(bytemuck::cast_slice(data))?;
        Ok(Self::single(proto, memory))
    }

    /// Rank-0 host tensor of one element.
    pub fn scalar<T: Element>(value: T) -> Result<Self> {
        Self::from_slice(&[value], Shape::scalar())
    }

    fn single(proto: Prototype, memory: Memory) -> Self {
        Self {
            fields: smallvec![Field { proto, memory }],
        }
    }

    fn primary(&self) -> &Field {
        &self.fields[0]
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn proto(&self) -> &Prototype {
        &self.primary().proto
    }

    pub fn dtype(&self) -> DType {
        self.proto().dtype()
    }

    pub fn shape(&self) -> &Shape {
        self.proto().shape()
    }

    pub fn sizes(&self) -> &[usize] {
        self.proto().sizes()
    }

    pub fn dims(&self) -> usize {
        self.proto().dims()
    }

    pub fn count(&self) -> usize {
        self.proto().count()
    }

    pub fn memory(&self) -> &Memory {
        &self.primary().memory
    }

    pub fn device(&self) -> Device {
        self.memory().device()
    }

    /// True iff the primary field holds zero elements. The VOID default has
    /// count 1 and is not empty; see [`Tensor::is_void`].
    pub fn empty(&self) -> bool {
        self.count() == 0
    }

    pub fn is_void(&self) -> bool {
        self.dtype() == DType::Void
    }

    // =========================================================================
    // Fields
    // =========================================================================

    pub fn fields_count(&self) -> usize {
        self.fields.len()
    }

    pub fn packed(&self) -> bool {
        self.fields.len() > 1
    }

    /// Single-field tensor aliasing field `index`.
    pub fn field(&self, index: usize) -> Result<Tensor> {
        let field = self.fields.get(index).ok_or(TsError::OutOfRange {
            index,
            len: self.fields.len(),
        })?;
        Ok(Self {
            fields: smallvec![field.clone()],
        })
    }

    /// Replaces field `index` with the primary field of `value`.
    pub fn set_field(&mut self, index: usize, value: &Tensor) -> Result<()> {
        let len = self.fields.len();
        let slot = self
            .fields
            .get_mut(index)
            .ok_or(TsError::OutOfRange { index, len })?;
        *slot = value.primary().clone();
        Ok(())
    }

    /// Bundles every field of `fields`, in order, into one tensor. An empty
    /// list yields `Tensor::default()`.
    pub fn pack(fields: Vec<Tensor>) -> Tensor {
        let flat: SmallVec<[Field; 1]> = fields.into_iter().flat_map(|t| t.fields).collect();
        if flat.is_empty() {
            return Tensor::default();
        }
        Tensor { fields: flat }
    }

    /// One single-field tensor per field.
    pub fn unpack(&self) -> Vec<Tensor> {
        self.fields
            .iter()
            .map(|field| Tensor {
                fields: smallvec![field.clone()],
            })
            .collect()
    }

    // =========================================================================
    // Copies and views
    // =========================================================================

    /// Deep copy: every field gets fresh memory from `controller`.
    pub fn clone_with(&self, controller: &dyn MemoryController) -> Result<Tensor> {
        let mut fields = SmallVec::with_capacity(self.fields.len());
        for field in &self.fields {
            let memory = controller.alloc(field.proto.bytes())?;
            memcpy_bytes(&memory, &field.memory, field.proto.bytes())?;
            fields.push(Field {
                proto: field.proto.clone(),
                memory,
            });
        }
        Ok(Tensor { fields })
    }

    /// Same fields with field 0 reinterpreted as `shape`. Memory is shared.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor> {
        let proto = Prototype::new(self.dtype(), shape);
        if proto.count() != self.count() {
            return Err(TsError::ShapeMismatch {
                expected: self.sizes().to_vec(),
                got: proto.sizes().to_vec(),
            });
        }
        let mut reshaped = self.clone();
        reshaped.fields[0].proto = proto;
        Ok(reshaped)
    }

    /// Every field placed on `device`; fields already there are aliased.
    pub fn view(&self, device: Device) -> Result<Tensor> {
        let mut fields = SmallVec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(Field {
                proto: field.proto.clone(),
                memory: field.memory.to_device(device)?,
            });
        }
        Ok(Tensor { fields })
    }

    // =========================================================================
    // Data access
    // =========================================================================

    fn check_dtype(&self, expected: DType) -> Result<()> {
        if self.dtype() != expected {
            return Err(TsError::DTypeMismatch {
                expected,
                got: self.dtype(),
            });
        }
        Ok(())
    }

    /// Copies the primary field's elements out to the host.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_dtype(T::DTYPE)?;
        let host = self.memory().to_device(Device::cpu())?;
        let bytes = host.data();
        Ok(bytes[..self.proto().bytes()]
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Overwrites the primary field's elements. Aliases observe the write.
    pub fn copy_from_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        self.check_dtype(T::DTYPE)?;
        if data.len() != self.count() {
            return Err(TsError::ShapeMismatch {
                expected: self.sizes().to_vec(),
                got: vec![data.len()],
            });
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.memory().data_mut()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}@{}", field.proto, field.memory.device())?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec::<f32>() {
            Ok(data) if data.len() <= 20 => write!(f, "tensor({:?}, shape={})", data, self.shape()),
            Ok(data) if !data.is_empty() => write!(
                f,
                "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                data[0],
                data[1],
                data[data.len() - 1],
                self.shape()
            ),
            _ => write!(f, "tensor(shape={}, dtype={})", self.shape(), self.dtype()),
        }
    }
}
