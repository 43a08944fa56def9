use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Reduction operations: reduce tensor to scalar
///
/// These operations collapse all dimensions and require special gradient handling
/// since the output shape differs from the input.
#[derive(Clone, Copy)]
pub enum ReduceOp {
    Sum,  // Σ(x) - gradient broadcasts ones
    Mean, // mean(x) - gradient broadcasts 1/n
}

/// Gradient function for Sum reduction
///
/// Sum reduction collapses to scalar, so gradient broadcasts back to original shape.
pub struct SumGradFn {
    input_shape: Vec<usize>,
}

impl GradFn for SumGradFn {
    fn backward(&self, out_grad: &RawTensor, _parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let size: usize = self.input_shape.iter().product();
        let grad_val: f32 = out_grad.data[0];
        vec![Some(RawTensor::new(
            vec![grad_val; size],
            &self.input_shape,
            false,
        ))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(SumGradFn {
            input_shape: self.input_shape.clone(),
        })
    }
}

/// Gradient function for Mean reduction
///
/// Each element gets gradient / `num_elements`.
pub struct MeanGradFn {
    input_shape: Vec<usize>,
}

impl GradFn for MeanGradFn {
    fn backward(&self, out_grad: &RawTensor, _parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let size: usize = self.input_shape.iter().product();
        let grad_val = out_grad.data[0] / (size as f32);
        vec![Some(RawTensor::new(
            vec![grad_val; size],
            &self.input_shape,
            false,
        ))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(MeanGradFn {
            input_shape: self.input_shape.clone(),
        })
    }
}

/// Gradient for `sum_dim`: broadcast the reduced gradient back to input shape
pub struct SumDimGradFn {
    input_shape: Vec<usize>,
    dim: usize,
    keepdim: bool,
}

impl GradFn for SumDimGradFn {
    fn backward(&self, out_grad: &RawTensor, _parents: &[Tensor]) -> Vec<Option<Tensor>> {
        // If keepdim=false, unsqueeze the dimension back first
        let mut expanded_shape = out_grad.shape.clone();
        if !self.keepdim {
            expanded_shape.insert(self.dim, 1);
        }

        let size: usize = self.input_shape.iter().product();
        let mut result = vec![0.0; size];
        let grad_strides = RawTensor::compute_strides(&expanded_shape);

        // Each input element receives the gradient of the output cell it was
        // summed into
        #[allow(clippy::needless_range_loop)]
        for i in 0..size {
            let mut coords = vec![0; self.input_shape.len()];
            let mut rem = i;
            for (d, &dim_sz) in self.input_shape.iter().enumerate().rev() {
                coords[d] = rem % dim_sz;
                rem /= dim_sz;
            }

            let mut grad_coords = coords;
            grad_coords[self.dim] = 0;

            let grad_idx: usize = grad_coords
                .iter()
                .zip(&grad_strides)
                .map(|(c, s)| c * s)
                .sum();
            result[i] = out_grad.data[grad_idx];
        }

        vec![Some(RawTensor::new(result, &self.input_shape, false))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(SumDimGradFn {
            input_shape: self.input_shape.clone(),
            dim: self.dim,
            keepdim: self.keepdim,
        })
    }
}

// ===== REDUCE OPERATIONS =====

impl RawTensor {
    /// Apply a reduction operation that collapses tensor to scalar
    ///
    /// All reduction ops produce a shape [1] output.
    pub fn reduce_op(self_t: &Tensor, op: ReduceOp) -> Tensor {
        let (data, shape, req_grad) = {
            let s = self_t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };

        let (result_val, grad_fn): (f32, Box<dyn GradFn>) = match op {
            ReduceOp::Sum => {
                let sum: f32 = data.iter().sum();
                (
                    sum,
                    Box::new(SumGradFn {
                        input_shape: shape,
                    }),
                )
            }
            ReduceOp::Mean => {
                let sum: f32 = data.iter().sum();
                let mean = sum / data.len() as f32;
                (
                    mean,
                    Box::new(MeanGradFn {
                        input_shape: shape,
                    }),
                )
            }
        };

        let out = Self::new(vec![result_val], &[1], req_grad);
        if req_grad {
            out.borrow_mut().parents = vec![self_t.clone()];
            out.borrow_mut().grad_fn = Some(grad_fn);
        }
        out
    }

    pub fn sum(self_t: &Tensor) -> Tensor {
        Self::reduce_op(self_t, ReduceOp::Sum)
    }

    pub fn mean(self_t: &Tensor) -> Tensor {
        Self::reduce_op(self_t, ReduceOp::Mean)
    }

    /// Sum along a specific axis
    ///
    /// # Arguments
    /// * `dim` - Axis to reduce (0-indexed)
    /// * `keepdim` - If true, keep reduced dimension as size 1
    pub fn sum_dim(self_t: &Tensor, dim: usize, keepdim: bool) -> Tensor {
        let (data, shape, req_grad) = {
            let s = self_t.borrow();
            assert!(
                dim < s.shape.len(),
                "dim {} out of bounds for shape {:?}",
                dim,
                s.shape
            );
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };

        let mut out_shape = shape.clone();
        out_shape[dim] = 1; // intermediate shape before squeeze
        let out_size: usize = out_shape.iter().product();
        let mut result = vec![0.0; out_size];
        let out_strides = Self::compute_strides(&out_shape);

        // Sum over the target dimension
        for (i, &v) in data.iter().enumerate() {
            let mut coords = vec![0; shape.len()];
            let mut rem = i;
            for (d, &dim_sz) in shape.iter().enumerate().rev() {
                coords[d] = rem % dim_sz;
                rem /= dim_sz;
            }

            let mut out_coords = coords;
            out_coords[dim] = 0;

            let out_idx: usize = out_coords
                .iter()
                .zip(&out_strides)
                .map(|(c, s)| c * s)
                .sum();
            result[out_idx] += v;
        }

        // Squeeze dimension if keepdim=false
        let final_shape = if keepdim {
            out_shape
        } else {
            out_shape
                .iter()
                .enumerate()
                .filter(|(d, _)| *d != dim)
                .map(|(_, &sz)| sz)
                .collect()
        };

        let out = Self::new(result, &final_shape, req_grad);
        if req_grad {
            out.borrow_mut().parents = vec![self_t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(SumDimGradFn {
                input_shape: shape,
                dim,
                keepdim,
            }));
        }
        out
    }
}
