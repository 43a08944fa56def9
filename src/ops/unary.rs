use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Unary operations: single input, single output
///
/// Each operation has a corresponding derivative:
/// - Neg: d(-x)/dx = -1
/// - Abs: d(|x|)/dx = sign(x)
/// - Sqrt: d(√x)/dx = 1/(2√x)
/// - `ReLU`: d(max(0,x))/dx = x > 0 ? 1 : 0
#[derive(Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sqrt,
    ReLU,
}

/// Gradient function for unary operations
///
/// Stores which operation was performed so backward can apply the correct derivative.
pub struct UnaryGradFn {
    op: UnaryOp,
}

impl GradFn for UnaryGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let x = parents
            .first()
            .map(|p| p.borrow())
            .expect("unary ops require 1 parent");

        // Apply chain rule: ∂L/∂x = ∂L/∂y · ∂y/∂x
        // where y = f(x) is the unary operation
        let grad_data: Vec<f32> = match self.op {
            UnaryOp::Neg => out_grad.data.iter().map(|&g| -g).collect(),
            UnaryOp::Abs => out_grad
                .data
                .iter()
                .zip(&x.data)
                .map(|(&g, &x)| {
                    if x > 0.0 {
                        g
                    } else if x < 0.0 {
                        -g
                    } else {
                        0.0
                    }
                })
                .collect(),
            UnaryOp::Sqrt => out_grad
                .data
                .iter()
                .zip(&x.data)
                .map(|(&g, &x)| g / (2.0 * x.sqrt()))
                .collect(),
            UnaryOp::ReLU => out_grad
                .data
                .iter()
                .zip(&x.data)
                .map(|(&g, &x)| if x > 0.0 { g } else { 0.0 })
                .collect(),
        };
        vec![Some(RawTensor::new(grad_data, &x.shape, false))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(Self { op: self.op })
    }
}

// ===== UNARY OPERATIONS =====

impl RawTensor {
    /// Apply a unary operation element-wise
    ///
    /// This is the unified implementation for all unary ops.
    /// Creates a new tensor and sets up gradient tracking if needed.
    pub fn unary_op(t: &Tensor, op: UnaryOp) -> Tensor {
        let (data, shape, req) = {
            let s = t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };

        let result: Vec<f32> = data
            .iter()
            .map(|&x| match op {
                UnaryOp::Neg => -x,
                UnaryOp::Abs => x.abs(),
                UnaryOp::Sqrt => x.sqrt(),
                UnaryOp::ReLU => x.max(0.0),
            })
            .collect();

        let out = Self::new(result, &shape, req);
        if req {
            out.borrow_mut().parents = vec![t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(UnaryGradFn { op }));
        }
        out
    }

    pub fn neg(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Neg)
    }
    pub fn abs(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Abs)
    }
    pub fn sqrt(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Sqrt)
    }
    pub fn relu(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::ReLU)
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_relu_forward() {
        let x = RawTensor::new(vec![-2.0, -0.5, 0.0, 1.5], &[4], false);
        let y = x.relu();
        assert_eq!(y.borrow().data, vec![0.0, 0.0, 0.0, 1.5]);
    }

    #[test]
    fn test_abs_backward_sign() {
        let x = RawTensor::new(vec![-3.0, 2.0], &[2], true);
        x.abs().sum().backward();
        assert_eq!(x.grad().unwrap(), vec![-1.0, 1.0]);
    }

    #[test]
    fn test_sqrt_gradcheck() {
        let x = RawTensor::new(vec![0.7, 1.3, 4.0, 0.2], &[4], true);
        let passed = RawTensor::check_gradients_simple(&x, |t| t.sqrt().sum());
        assert!(passed);
    }
}
