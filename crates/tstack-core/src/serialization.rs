//! Tensor binary format.
//!
//! Little-endian throughout:
//!
//! ```text
//! u32 field_count
//! field_count × { u8 dtype, u32 rank, rank × u32 extent, count × type_bytes raw bytes }
//! ```
//!
//! Device buffers are staged through the host on write; the byte length of a
//! field is always recomputed from its decoded prototype.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    DType, Device, DynamicMemoryController, Extents, MemoryController, Prototype, Result, Shape,
    Tensor, TsError,
};

/// Rank followed by every extent, as written ahead of a field's bytes.
type FieldHeader = SmallVec<[u32; 5]>;

fn encode_header(proto: &Prototype) -> Result<FieldHeader> {
    let overflow = || TsError::ShapeOverflow {
        dims: proto.sizes().to_vec(),
    };
    let mut header = FieldHeader::with_capacity(proto.dims() + 1);
    header.push(u32::try_from(proto.dims()).map_err(|_| overflow())?);
    for &size in proto.sizes() {
        header.push(u32::try_from(size).map_err(|_| overflow())?);
    }
    Ok(header)
}

fn write_field<W: Write>(stream: &mut W, field: &Tensor, header: &[u32]) -> Result<usize> {
    let proto = field.proto();
    stream.write_u8(proto.dtype().code())?;
    for &value in header {
        stream.write_u32::<LittleEndian>(value)?;
    }

    let memory = if field.device().is_cpu() {
        field.memory().clone()
    } else {
        field.memory().to_device(Device::cpu())?
    };
    let bytes = proto.bytes();
    stream.write_all(&memory.data()[..bytes])?;

    Ok(field_header_size(proto) + bytes)
}

fn read_field<R: Read>(stream: &mut R, controller: &dyn MemoryController) -> Result<Tensor> {
    let dtype = DType::try_from(stream.read_u8().map_err(TsError::from_read)?)?;
    let rank = stream
        .read_u32::<LittleEndian>()
        .map_err(TsError::from_read)?;
    let mut dims = Extents::new();
    for _ in 0..rank {
        let size = stream
            .read_u32::<LittleEndian>()
            .map_err(TsError::from_read)?;
        dims.push(size as usize);
    }

    let shape = Shape::from(dims);
    let bytes = shape
        .checked_numel()
        .and_then(|count| count.checked_mul(dtype.type_bytes()));
    if bytes.is_none() {
        return Err(TsError::CorruptFormat(format!(
            "field {dtype}{shape} overflows addressable bytes"
        )));
    }

    let proto = Prototype::new(dtype, shape);
    let tensor = Tensor::new(controller, proto)?;
    {
        let mut data = tensor.memory().data_mut();
        stream.read_exact(&mut data).map_err(TsError::from_read)?;
    }
    Ok(tensor)
}

fn field_header_size(proto: &Prototype) -> usize {
    1 /* dtype */ + 4 /* rank */ + 4 * proto.dims()
}

impl Tensor {
    /// Writes every field to `stream`. Returns bytes written.
    ///
    /// Every header is encoded before the first byte is written, so a shape
    /// the format cannot carry leaves `stream` untouched.
    pub fn serialize<W: Write>(&self, stream: &mut W) -> Result<usize> {
        let fields = self.unpack();
        let field_count = u32::try_from(fields.len()).map_err(|_| TsError::OutOfRange {
            index: fields.len(),
            len: u32::MAX as usize,
        })?;
        let headers = fields
            .iter()
            .map(|field| encode_header(field.proto()))
            .collect::<Result<Vec<_>>>()?;

        stream.write_u32::<LittleEndian>(field_count)?;
        let mut written = 4;
        for (field, header) in fields.iter().zip(&headers) {
            written += write_field(stream, field, header)?;
        }
        trace!(fields = self.fields_count(), bytes = written, "tensor serialized");
        Ok(written)
    }

    /// Reads a tensor written by [`Tensor::serialize`].
    ///
    /// Field memory comes from `controller`, or from a fresh host
    /// [`DynamicMemoryController`] when none is given.
    pub fn externalize<R: Read>(
        stream: &mut R,
        controller: Option<&dyn MemoryController>,
    ) -> Result<Tensor> {
        let fallback;
        let controller: &dyn MemoryController = match controller {
            Some(controller) => controller,
            None => {
                fallback = DynamicMemoryController::new(Device::cpu());
                &fallback
            }
        };

        let field_count = stream
            .read_u32::<LittleEndian>()
            .map_err(TsError::from_read)?;
        let mut fields = Vec::with_capacity((field_count as usize).min(16));
        for _ in 0..field_count {
            fields.push(read_field(stream, controller)?);
        }
        trace!(fields = field_count, device = %controller.device(), "tensor externalized");
        Ok(Tensor::pack(fields))
    }

    /// Bytes [`Tensor::serialize`] will write.
    pub fn serialized_size(&self) -> usize {
        4 + self
            .unpack()
            .iter()
            .map(|field| field_header_size(field.proto()) + field.proto().bytes())
            .sum::<usize>()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.serialized_size());
        self.serialize(&mut buffer)?;
        Ok(buffer)
    }

    /// Decodes a whole buffer into host memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Tensor> {
        let mut cursor = bytes;
        Tensor::externalize(&mut cursor, None)
    }
}
