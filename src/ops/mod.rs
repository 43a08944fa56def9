// Operation enums and trait implementations
pub mod binary;
pub mod conv;
pub mod movement;
pub mod reduce;
pub mod unary;

// Re-export operation types
pub use binary::{BinaryGradFn, BinaryOp};
pub use conv::{Conv2dGradFn, Padding};
pub use movement::{MovementGradFn, MovementOp, depth_to_space};
pub use reduce::{MeanGradFn, ReduceOp, SumDimGradFn, SumGradFn};
pub use unary::{UnaryGradFn, UnaryOp};

// ===== LOAD OPERATIONS =====

impl RawTensor {
    /// Create tensor filled with constant value
    pub fn constant(value: f32, shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![value; size], shape, false)
    }
    /// Create tensor from existing Vec
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Tensor {
        Self::new(data, shape, false)
    }
}

// Import core types for operation implementations
use crate::{RawTensor, Tensor};
