use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Binary operations: two inputs, one output
///
/// Broadcasting is automatically handled for compatible shapes
/// (numpy-style, right-aligned).
#[derive(Clone, Copy)]
pub enum BinaryOp {
    Add, // x + y
    Sub, // x - y
    Mul, // x * y (element-wise)
}

// ===== BROADCASTING HELPERS =====

impl RawTensor {
    /// Broadcast shape of two operands, or None if incompatible
    pub(crate) fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
        let rank = a.len().max(b.len());
        let mut out = vec![0; rank];
        for d in 0..rank {
            let da = if d < rank - a.len() { 1 } else { a[d - (rank - a.len())] };
            let db = if d < rank - b.len() { 1 } else { b[d - (rank - b.len())] };
            out[d] = if da == db || db == 1 {
                da
            } else if da == 1 {
                db
            } else {
                return None;
            };
        }
        Some(out)
    }

    /// Materialize `data` (of shape `from`) broadcast to shape `to`
    pub(crate) fn broadcast_to(data: &[f32], from: &[usize], to: &[usize]) -> Vec<f32> {
        if from == to {
            return data.to_vec();
        }
        let mut padded = vec![1; to.len() - from.len()];
        padded.extend_from_slice(from);
        let strides = Self::compute_strides(&padded);

        let out_size: usize = to.iter().product();
        let mut out = Vec::with_capacity(out_size);
        for i in 0..out_size {
            let mut rem = i;
            let mut src = 0;
            for d in (0..to.len()).rev() {
                let coord = rem % to[d];
                rem /= to[d];
                // Size-1 dimensions repeat the same source element
                if padded[d] != 1 {
                    src += coord * strides[d];
                }
            }
            out.push(data[src]);
        }
        out
    }

    /// Reduce `data` (of shape `from`) back down to shape `to` by summing over
    /// the dimensions that were broadcast in the forward pass
    pub(crate) fn sum_over_broadcast_dims(data: &[f32], from: &[usize], to: &[usize]) -> Vec<f32> {
        if from == to {
            return data.to_vec();
        }
        let mut padded = vec![1; from.len() - to.len()];
        padded.extend_from_slice(to);
        let strides = Self::compute_strides(&padded);

        let mut out = vec![0.0; to.iter().product()];
        for (i, &g) in data.iter().enumerate() {
            let mut rem = i;
            let mut dst = 0;
            for d in (0..from.len()).rev() {
                let coord = rem % from[d];
                rem /= from[d];
                if padded[d] != 1 {
                    dst += coord * strides[d];
                }
            }
            out[dst] += g;
        }
        out
    }
}

// ===== GRADIENT FUNCTION =====

/// Gradient function for binary operations
///
/// Handles broadcasting during backward pass - gradients must be summed
/// over dimensions that were broadcast in the forward pass.
pub struct BinaryGradFn {
    op: BinaryOp,
}

impl GradFn for BinaryGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let x_ref = parents.first().cloned().expect("binary ops require 2 parents");
        let y_ref = parents.get(1).cloned().expect("binary ops require 2 parents");
        let x_val = x_ref.borrow();
        let y_val = y_ref.borrow();

        let (grad_x, grad_y) = match self.op {
            BinaryOp::Add => {
                // ∂(x+y)/∂x = 1, ∂(x+y)/∂y = 1
                let gx = x_val.requires_grad.then(|| {
                    let summed = RawTensor::sum_over_broadcast_dims(
                        &out_grad.data,
                        &out_grad.shape,
                        &x_val.shape,
                    );
                    RawTensor::new(summed, &x_val.shape, false)
                });
                let gy = y_val.requires_grad.then(|| {
                    let summed = RawTensor::sum_over_broadcast_dims(
                        &out_grad.data,
                        &out_grad.shape,
                        &y_val.shape,
                    );
                    RawTensor::new(summed, &y_val.shape, false)
                });
                (gx, gy)
            }
            BinaryOp::Sub => {
                // ∂(x-y)/∂x = 1, ∂(x-y)/∂y = -1
                let gx = x_val.requires_grad.then(|| {
                    let summed = RawTensor::sum_over_broadcast_dims(
                        &out_grad.data,
                        &out_grad.shape,
                        &x_val.shape,
                    );
                    RawTensor::new(summed, &x_val.shape, false)
                });
                let gy = y_val.requires_grad.then(|| {
                    let neg_grad: Vec<f32> = out_grad.data.iter().map(|&g| -g).collect();
                    let summed = RawTensor::sum_over_broadcast_dims(
                        &neg_grad,
                        &out_grad.shape,
                        &y_val.shape,
                    );
                    RawTensor::new(summed, &y_val.shape, false)
                });
                (gx, gy)
            }
            BinaryOp::Mul => {
                // ∂(x*y)/∂x = y, ∂(x*y)/∂y = x
                let gx = x_val.requires_grad.then(|| {
                    let y_bc = RawTensor::broadcast_to(&y_val.data, &y_val.shape, &out_grad.shape);
                    let grad: Vec<f32> = out_grad
                        .data
                        .iter()
                        .zip(&y_bc)
                        .map(|(&g, &y)| g * y)
                        .collect();
                    let summed =
                        RawTensor::sum_over_broadcast_dims(&grad, &out_grad.shape, &x_val.shape);
                    RawTensor::new(summed, &x_val.shape, false)
                });
                let gy = y_val.requires_grad.then(|| {
                    let x_bc = RawTensor::broadcast_to(&x_val.data, &x_val.shape, &out_grad.shape);
                    let grad: Vec<f32> = out_grad
                        .data
                        .iter()
                        .zip(&x_bc)
                        .map(|(&g, &x)| g * x)
                        .collect();
                    let summed =
                        RawTensor::sum_over_broadcast_dims(&grad, &out_grad.shape, &y_val.shape);
                    RawTensor::new(summed, &y_val.shape, false)
                });
                (gx, gy)
            }
        };

        vec![grad_x, grad_y]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(BinaryGradFn { op: self.op })
    }
}

// ===== BINARY OPERATIONS =====

impl RawTensor {
    /// Apply a binary operation element-wise with broadcasting
    ///
    /// # Panics
    /// Panics if the operand shapes cannot be broadcast together.
    pub fn binary_op(self_t: &Tensor, other: &Tensor, op: BinaryOp) -> Tensor {
        let (data_a, shape_a, req_a) = {
            let t = self_t.borrow();
            (t.data.clone(), t.shape.clone(), t.requires_grad)
        };
        let (data_b, shape_b, req_b) = {
            let t = other.borrow();
            (t.data.clone(), t.shape.clone(), t.requires_grad)
        };

        let out_shape = Self::broadcast_shape(&shape_a, &shape_b)
            .unwrap_or_else(|| panic!("Cannot broadcast shapes {shape_a:?} and {shape_b:?}"));

        let a = Self::broadcast_to(&data_a, &shape_a, &out_shape);
        let b = Self::broadcast_to(&data_b, &shape_b, &out_shape);

        let result: Vec<f32> = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
            })
            .collect();

        let req = req_a || req_b;
        let out = Self::new(result, &out_shape, req);
        if req {
            out.borrow_mut().parents = vec![self_t.clone(), other.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(BinaryGradFn { op }));
        }
        out
    }

    pub fn add(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Add)
    }
    pub fn sub(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Sub)
    }
    pub fn elem_mul(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Mul)
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_broadcast_add_shapes() {
        let x = RawTensor::new(vec![1.0; 24], &[2, 2, 2, 3], false);
        let b = RawTensor::new(vec![1.0, 2.0], &[1, 2, 1, 1], false);
        let y = x.add(&b);
        assert_eq!(y.borrow().shape, vec![2, 2, 2, 3]);
        // First channel gets +1, second channel +2
        assert_eq!(y.borrow().data[0], 2.0);
        assert_eq!(y.borrow().data[6], 3.0);
    }

    #[test]
    fn test_broadcast_grad_sums_over_batch() {
        let x = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], true);
        let b = RawTensor::new(vec![10.0, 20.0], &[2], true);
        let y = x.add(&b);
        y.sum().backward();

        // b was broadcast over the batch dimension, so its grad sums over it
        assert_eq!(x.grad().unwrap(), vec![1.0, 1.0, 1.0, 1.0]);
        assert_eq!(b.grad().unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_scalar_minus_tensor() {
        let one = RawTensor::new(vec![1.0], &[1], false);
        let m = RawTensor::new(vec![0.25, 0.5, 2.0, 1.0], &[1, 1, 2, 2], true);
        let out = one.sub(&m);
        assert_eq!(out.borrow().data, vec![0.75, 0.5, -1.0, 0.0]);

        out.sum().backward();
        assert_eq!(m.grad().unwrap(), vec![-1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_mul_gradcheck() {
        let x = RawTensor::new(vec![0.5, -1.5, 2.0, 0.25], &[2, 2], true);
        let scale = RawTensor::new(vec![3.0, -2.0], &[2], false);
        let passed = RawTensor::check_gradients_simple(&x, |t| t.elem_mul(&scale).sum());
        assert!(passed);
    }
}
