use crate::error::{Result, UpresError};
use crate::tensor::{RawTensor, Tensor};
use std::collections::BTreeMap;

/// Weight initialization for a parameter entry
#[derive(Clone, Copy, Debug)]
pub enum Init {
    /// Fan-in variance scaling, N(0, gain / fan_in)
    HeNormal { gain: f32 },
    /// Constant fill (PReLU slopes)
    Const(f32),
    /// Zero fill (biases)
    Zeros,
}

/// Explicit registry of learned tensors, keyed by stage-scoped names
/// (`"features/w"`, `"mapping/w3"`, ...).
///
/// A model owns one store and every sub-builder receives it explicitly.
/// Each entry is created exactly once: asking for an existing name returns
/// the same `Rc` allocation, which is how the mapping block shares weights
/// across its repetitions. Asking for an existing name with a different
/// shape is a construction error.
pub struct ParamStore {
    entries: BTreeMap<String, Tensor>,
}

impl ParamStore {
    pub fn new() -> Self {
        ParamStore {
            entries: BTreeMap::new(),
        }
    }

    /// Fetch a parameter, creating it on first use
    ///
    /// Created tensors have `requires_grad = true`; reuse hands back the
    /// existing allocation so gradients from every use site accumulate in
    /// one place.
    pub fn get_or_init(&mut self, name: &str, shape: &[usize], init: Init) -> Result<Tensor> {
        if let Some(existing) = self.entries.get(name) {
            let existing_shape = existing.borrow().shape.clone();
            if existing_shape != shape {
                return Err(UpresError::ParamShapeConflict {
                    name: name.to_string(),
                    existing: existing_shape,
                    requested: shape.to_vec(),
                });
            }
            return Ok(existing.clone());
        }

        let tensor = match init {
            Init::HeNormal { gain } => RawTensor::he_normal(shape, gain),
            Init::Const(value) => RawTensor::constant(value, shape),
            Init::Zeros => RawTensor::zeros(shape),
        };
        tensor.borrow_mut().requires_grad = true;
        self.entries.insert(name.to_string(), tensor.clone());
        Ok(tensor)
    }

    /// Look up an existing parameter by name
    pub fn get(&self, name: &str) -> Option<Tensor> {
        self.entries.get(name).cloned()
    }

    /// All registered names, in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All learned tensors, in name order
    ///
    /// This is the set an external optimizer updates.
    pub fn parameters(&self) -> Vec<Tensor> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear accumulated gradients on every parameter
    pub fn zero_grad(&self) {
        for param in self.entries.values() {
            param.borrow_mut().grad = None;
        }
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}
