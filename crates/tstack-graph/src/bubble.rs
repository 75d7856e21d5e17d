//! Operator descriptors attached to graph nodes.

use std::collections::BTreeMap;

use tstack_core::{DType, Device, Prototype, Result, Tensor, TsError};

/// Reserved op kinds.
pub mod op {
    /// Graph input supplied at run time.
    pub const PARAMETER: &str = "<param>";
    /// Constant carrying its value in the `value` param.
    pub const CONST: &str = "<const>";
}

/// Reserved param keys.
pub mod param {
    pub const VALUE: &str = "value";
}

/// Operator kind, display name and named tensor params.
#[derive(Clone, Debug)]
pub struct Bubble {
    op: String,
    name: String,
    output_count: usize,
    params: BTreeMap<String, Tensor>,
}

impl Bubble {
    pub fn new(op: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            name: name.into(),
            output_count: 1,
            params: BTreeMap::new(),
        }
    }

    pub fn with_output_count(mut self, output_count: usize) -> Self {
        self.output_count = output_count;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Tensor) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Same name and params under a different op kind.
    pub fn with_op(&self, op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            ..self.clone()
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    pub fn params(&self) -> &BTreeMap<String, Tensor> {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.params.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Tensor) {
        self.params.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Tensor> {
        self.params.remove(key)
    }

    /// INT32 param as a vector; `None` when absent.
    pub fn get_i32s(&self, key: &str) -> Result<Option<Vec<i32>>> {
        self.params.get(key).map(|t| t.to_vec::<i32>()).transpose()
    }

    /// CHAR8 param as a string; `None` when absent.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        let Some(value) = self.params.get(key) else {
            return Ok(None);
        };
        if value.dtype() != DType::Char8 {
            return Err(TsError::DTypeMismatch {
                expected: DType::Char8,
                got: value.dtype(),
            });
        }
        let host = value.memory().to_device(Device::cpu())?;
        let bytes = host.data();
        Ok(Some(
            String::from_utf8_lossy(&bytes[..value.proto().bytes()]).into_owned(),
        ))
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: &str) -> Result<()> {
        let t = Tensor::on_device(
            Device::cpu(),
            Prototype::new(DType::Char8, [value.len()]),
        )?;
        t.memory().data_mut().copy_from_slice(value.as_bytes());
        self.set(key, t);
        Ok(())
    }
}
