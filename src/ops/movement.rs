use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Movement operations: reshape/reorder data without changing values
///
/// These operations don't modify data values, only how they're indexed.
/// Gradients must "undo" these operations during backpropagation.
#[derive(Clone)]
pub enum MovementOp {
    Reshape { new_shape: Vec<usize> }, // Change shape, preserve order
    Permute { axes: Vec<usize> },      // Transpose/reorder axes
    ReflectPad { pad: usize },         // Mirror edges on the last two axes
}

/// Unified gradient function for all movement operations
///
/// Movement ops don't change data values, only how they're indexed.
/// During backward, we need to "undo" the movement to restore the original shape.
#[derive(Clone)]
pub struct MovementGradFn {
    op: MovementOp,
    original_shape: Vec<usize>,
}

impl GradFn for MovementGradFn {
    fn backward(&self, out_grad: &RawTensor, _parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let grad_tensor = match &self.op {
            MovementOp::Reshape { .. } => {
                // Reshape back to original shape
                RawTensor::new(out_grad.data.clone(), &self.original_shape, false)
            }
            MovementOp::Permute { axes } => {
                // Invert the permutation to restore original order
                let mut inverse_axes = vec![0; axes.len()];
                for (i, &ax) in axes.iter().enumerate() {
                    inverse_axes[ax] = i;
                }
                let (data, shape) = permute_data(&out_grad.data, &out_grad.shape, &inverse_axes);
                RawTensor::new(data, &shape, false)
            }
            MovementOp::ReflectPad { pad } => {
                // Several padded positions mirror one source pixel; their
                // gradients accumulate there
                let rank = self.original_shape.len();
                let h = self.original_shape[rank - 2];
                let w = self.original_shape[rank - 1];
                let leading: usize = self.original_shape[..rank - 2].iter().product();
                let (oh, ow) = (h + 2 * pad, w + 2 * pad);

                let mut grad = vec![0.0; self.original_shape.iter().product()];
                for l in 0..leading {
                    for y in 0..oh {
                        let sy = reflect_index(y, *pad, h);
                        for x in 0..ow {
                            let sx = reflect_index(x, *pad, w);
                            grad[(l * h + sy) * w + sx] += out_grad.data[(l * oh + y) * ow + x];
                        }
                    }
                }
                RawTensor::new(grad, &self.original_shape, false)
            }
        };
        vec![Some(grad_tensor)]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(self.clone())
    }
}

// ===== INDEXING HELPERS =====

/// Map a padded coordinate back into [0, n) by mirroring around the edges
/// (the border pixel itself is not repeated)
fn reflect_index(i: usize, pad: usize, n: usize) -> usize {
    let t = i as isize - pad as isize;
    if t < 0 {
        (-t) as usize
    } else if t as usize >= n {
        2 * n - 2 - t as usize
    } else {
        t as usize
    }
}

fn permute_data(data: &[f32], shape: &[usize], axes: &[usize]) -> (Vec<f32>, Vec<usize>) {
    let out_shape: Vec<usize> = axes.iter().map(|&a| shape[a]).collect();
    let in_strides = RawTensor::compute_strides(shape);
    let out_size: usize = out_shape.iter().product();

    let mut out = Vec::with_capacity(out_size);
    for i in 0..out_size {
        let mut rem = i;
        let mut src = 0;
        for d in (0..out_shape.len()).rev() {
            let coord = rem % out_shape[d];
            rem /= out_shape[d];
            src += coord * in_strides[axes[d]];
        }
        out.push(data[src]);
    }
    (out, out_shape)
}

fn reflect_pad_data(data: &[f32], shape: &[usize], pad: usize) -> (Vec<f32>, Vec<usize>) {
    let rank = shape.len();
    assert!(
        rank >= 2,
        "reflect_pad: expected at least 2 dimensions, got shape {shape:?}"
    );
    let h = shape[rank - 2];
    let w = shape[rank - 1];
    assert!(
        pad < h && pad < w,
        "reflect_pad: pad {pad} must be smaller than the spatial size {h}x{w}"
    );
    let (oh, ow) = (h + 2 * pad, w + 2 * pad);
    let leading: usize = shape[..rank - 2].iter().product();

    let mut out = Vec::with_capacity(leading * oh * ow);
    for l in 0..leading {
        for y in 0..oh {
            let sy = reflect_index(y, pad, h);
            for x in 0..ow {
                let sx = reflect_index(x, pad, w);
                out.push(data[(l * h + sy) * w + sx]);
            }
        }
    }

    let mut out_shape = shape.to_vec();
    out_shape[rank - 2] = oh;
    out_shape[rank - 1] = ow;
    (out, out_shape)
}

// ===== MOVEMENT OPERATIONS =====

impl RawTensor {
    pub fn movement_op(self_t: &Tensor, op: MovementOp) -> Tensor {
        let (data, shape, req_grad) = {
            let s = self_t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };

        let (result, out_shape) = match &op {
            MovementOp::Reshape { new_shape } => {
                assert_eq!(
                    shape.iter().product::<usize>(),
                    new_shape.iter().product::<usize>(),
                    "Cannot reshape {shape:?} into {new_shape:?}"
                );
                (data, new_shape.clone())
            }
            MovementOp::Permute { axes } => {
                assert_eq!(
                    axes.len(),
                    shape.len(),
                    "Permutation {axes:?} does not match shape {shape:?}"
                );
                permute_data(&data, &shape, axes)
            }
            MovementOp::ReflectPad { pad } => reflect_pad_data(&data, &shape, *pad),
        };

        let out = Self::new(result, &out_shape, req_grad);
        if req_grad {
            out.borrow_mut().parents = vec![self_t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(MovementGradFn {
                op,
                original_shape: shape,
            }));
        }
        out
    }

    pub fn reshape(self_t: &Tensor, new_shape: &[usize]) -> Tensor {
        Self::movement_op(
            self_t,
            MovementOp::Reshape {
                new_shape: new_shape.to_vec(),
            },
        )
    }

    pub fn permute(self_t: &Tensor, axes: &[usize]) -> Tensor {
        Self::movement_op(
            self_t,
            MovementOp::Permute {
                axes: axes.to_vec(),
            },
        )
    }

    pub fn reflect_pad(self_t: &Tensor, pad: usize) -> Tensor {
        Self::movement_op(self_t, MovementOp::ReflectPad { pad })
    }
}

// ===== DEPTH TO SPACE =====

/// Rearranges elements from (B, C·r², H, W) to (B, C, H·r, W·r)
///
/// This is the sub-pixel shuffle described in "Real-Time Single Image and
/// Video Super-Resolution Using an Efficient Sub-Pixel Convolutional Neural
/// Network" (Shi et al., 2016): channel groups become r×r spatial blocks.
///
/// # Panics
/// Panics on non-4D input or channels not divisible by r².
pub fn depth_to_space(x: &Tensor, scale: usize) -> Tensor {
    assert!(scale > 0, "depth_to_space: scale must be positive");
    let shape = x.borrow().shape.clone();
    assert_eq!(
        shape.len(),
        4,
        "depth_to_space: expected 4D input (B, C, H, W), got shape {shape:?}"
    );

    let (batch, channels, height, width) = (shape[0], shape[1], shape[2], shape[3]);
    let r = scale;
    let r_squared = r * r;
    assert_eq!(
        channels % r_squared,
        0,
        "depth_to_space: input channels ({channels}) must be divisible by scale² ({r_squared})"
    );
    let out_channels = channels / r_squared;

    use crate::tensor::TensorOps;
    // (B, C·r², H, W) → (B, C, r, r, H, W) → (B, C, H, r, W, r) → (B, C, H·r, W·r)
    x.reshape(&[batch, out_channels, r, r, height, width])
        .permute(&[0, 1, 4, 2, 5, 3])
        .reshape(&[batch, out_channels, height * r, width * r])
}

#[cfg(test)]
mod tests {
    use super::depth_to_space;
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_permute_roundtrip() {
        let x = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false);
        let y = x.permute(&[1, 0]);
        assert_eq!(y.borrow().shape, vec![3, 2]);
        assert_eq!(y.borrow().data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let z = y.permute(&[1, 0]);
        assert_eq!(z.borrow().data, x.borrow().data);
    }

    #[test]
    fn test_reflect_pad_values() {
        // 3x3 ramp, padded by 1: edges mirror without repeating the border
        let x = RawTensor::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            &[1, 1, 3, 3],
            false,
        );
        let y = x.reflect_pad(1);
        assert_eq!(y.borrow().shape, vec![1, 1, 5, 5]);
        let expected = vec![
            5.0, 4.0, 5.0, 6.0, 5.0, //
            2.0, 1.0, 2.0, 3.0, 2.0, //
            5.0, 4.0, 5.0, 6.0, 5.0, //
            8.0, 7.0, 8.0, 9.0, 8.0, //
            5.0, 4.0, 5.0, 6.0, 5.0,
        ];
        assert_eq!(y.borrow().data, expected);
    }

    #[test]
    fn test_reflect_pad_gradcheck() {
        let x = RawTensor::new(vec![0.5, -1.0, 2.0, 3.0], &[1, 1, 2, 2], true);
        let passed = RawTensor::check_gradients_simple(&x, |t| t.reflect_pad(1).sum());
        assert!(passed);
    }

    #[test]
    fn test_depth_to_space_shape() {
        let x = RawTensor::randn(&[2, 12, 4, 4]); // 3 channels * 4
        let y = depth_to_space(&x, 2);
        assert_eq!(y.borrow().shape, vec![2, 3, 8, 8]);
    }

    #[test]
    fn test_depth_to_space_block_layout() {
        // One pixel per channel plane: the 4 channels become one 2x2 block
        let x = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0], &[1, 4, 1, 1], false);
        let y = depth_to_space(&x, 2);
        assert_eq!(y.borrow().shape, vec![1, 1, 2, 2]);
        assert_eq!(y.borrow().data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    #[should_panic(expected = "must be divisible")]
    fn test_depth_to_space_invalid_channels() {
        let x = RawTensor::randn(&[1, 5, 4, 4]); // 5 is not divisible by 4
        depth_to_space(&x, 2);
    }

    #[test]
    fn test_depth_to_space_gradient_flow() {
        let x = RawTensor::randn(&[1, 4, 3, 3]);
        x.borrow_mut().requires_grad = true;

        let y = depth_to_space(&x, 2);
        y.sum().backward();

        let grad = x.grad();
        assert!(
            grad.is_some(),
            "Gradient should flow back through depth_to_space"
        );
        assert_eq!(grad.unwrap().len(), 36);
    }
}
