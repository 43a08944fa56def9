use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Padding (specific way of adding zeros to the input matrix) used in a
/// convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    /// Output has the same spatial shape as input (stride 1, odd kernels).
    Same,
    /// No padding; output shrinks by kernel_size − 1.
    Valid,
}

impl Padding {
    /// Zero rows/columns implicitly added on each side for a kernel extent
    pub(crate) fn amount(self, kernel: usize) -> usize {
        match self {
            Padding::Valid => 0,
            Padding::Same => {
                assert!(
                    kernel % 2 == 1,
                    "Same padding requires an odd kernel, got {kernel}"
                );
                (kernel - 1) / 2
            }
        }
    }
}

/// Gradient function for 2D convolution
///
/// Parents are `[input, weight]`. The input gradient is the correlation of the
/// output gradient with the kernel flipped back onto the input; the weight
/// gradient correlates the input with the output gradient. Both come out of a
/// single walk over the output positions.
pub struct Conv2dGradFn {
    pad_h: usize,
    pad_w: usize,
}

impl GradFn for Conv2dGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let input_ref = parents.first().cloned().expect("conv2d requires 2 parents");
        let weight_ref = parents.get(1).cloned().expect("conv2d requires 2 parents");
        let input = input_ref.borrow();
        let weight = weight_ref.borrow();

        let (batch, in_ch, h, w) = (
            input.shape[0],
            input.shape[1],
            input.shape[2],
            input.shape[3],
        );
        let (out_ch, kh, kw) = (weight.shape[0], weight.shape[2], weight.shape[3]);
        let (oh, ow) = (out_grad.shape[2], out_grad.shape[3]);

        let mut grad_in = vec![0.0; input.data.len()];
        let mut grad_w = vec![0.0; weight.data.len()];

        for b in 0..batch {
            for o in 0..out_ch {
                for y in 0..oh {
                    for x in 0..ow {
                        let g = out_grad.data[((b * out_ch + o) * oh + y) * ow + x];
                        if g == 0.0 {
                            continue;
                        }
                        for c in 0..in_ch {
                            for ky in 0..kh {
                                let iy = y + ky;
                                if iy < self.pad_h {
                                    continue;
                                }
                                let iy = iy - self.pad_h;
                                if iy >= h {
                                    continue;
                                }
                                for kx in 0..kw {
                                    let ix = x + kx;
                                    if ix < self.pad_w {
                                        continue;
                                    }
                                    let ix = ix - self.pad_w;
                                    if ix >= w {
                                        continue;
                                    }
                                    let in_idx = ((b * in_ch + c) * h + iy) * w + ix;
                                    let w_idx = ((o * in_ch + c) * kh + ky) * kw + kx;
                                    grad_in[in_idx] += g * weight.data[w_idx];
                                    grad_w[w_idx] += g * input.data[in_idx];
                                }
                            }
                        }
                    }
                }
            }
        }

        vec![
            input
                .requires_grad
                .then(|| RawTensor::new(grad_in, &input.shape, false)),
            weight
                .requires_grad
                .then(|| RawTensor::new(grad_w, &weight.shape, false)),
        ]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(Conv2dGradFn {
            pad_h: self.pad_h,
            pad_w: self.pad_w,
        })
    }
}

// ===== CONVOLUTION =====

impl RawTensor {
    /// 2D convolution over an NCHW batch, stride 1
    ///
    /// * `input` - (B, C, H, W)
    /// * `weight` - (O, C, KH, KW)
    ///
    /// Output is (B, O, H', W') where H'/W' follow from the padding mode.
    /// Bias is not part of this op; add it as a broadcast `[1, O, 1, 1]` add.
    ///
    /// # Panics
    /// Panics on rank or channel mismatches. Callers building model graphs
    /// validate shapes first (see the `shape` module) so these are
    /// unreachable from the public builders.
    pub fn conv2d(input: &Tensor, weight: &Tensor, padding: Padding) -> Tensor {
        let (x, xs, x_req) = {
            let t = input.borrow();
            (t.data.clone(), t.shape.clone(), t.requires_grad)
        };
        let (wt, ws, w_req) = {
            let t = weight.borrow();
            (t.data.clone(), t.shape.clone(), t.requires_grad)
        };

        assert_eq!(xs.len(), 4, "conv2d: expected 4D input (B, C, H, W), got {xs:?}");
        assert_eq!(ws.len(), 4, "conv2d: expected 4D weight (O, C, KH, KW), got {ws:?}");

        let (batch, in_ch, h, w) = (xs[0], xs[1], xs[2], xs[3]);
        let (out_ch, w_in_ch, kh, kw) = (ws[0], ws[1], ws[2], ws[3]);
        assert_eq!(
            in_ch, w_in_ch,
            "conv2d: input has {in_ch} channels, kernel expects {w_in_ch}"
        );

        let pad_h = padding.amount(kh);
        let pad_w = padding.amount(kw);
        assert!(
            h + 2 * pad_h >= kh && w + 2 * pad_w >= kw,
            "conv2d: {kh}x{kw} kernel does not fit {h}x{w} input"
        );
        let oh = h + 2 * pad_h - kh + 1;
        let ow = w + 2 * pad_w - kw + 1;

        let mut out = vec![0.0; batch * out_ch * oh * ow];
        for b in 0..batch {
            for o in 0..out_ch {
                for y in 0..oh {
                    for x_pos in 0..ow {
                        let mut acc = 0.0;
                        for c in 0..in_ch {
                            for ky in 0..kh {
                                let iy = y + ky;
                                if iy < pad_h {
                                    continue;
                                }
                                let iy = iy - pad_h;
                                if iy >= h {
                                    continue;
                                }
                                for kx in 0..kw {
                                    let ix = x_pos + kx;
                                    if ix < pad_w {
                                        continue;
                                    }
                                    let ix = ix - pad_w;
                                    if ix >= w {
                                        continue;
                                    }
                                    acc += x[((b * in_ch + c) * h + iy) * w + ix]
                                        * wt[((o * in_ch + c) * kh + ky) * kw + kx];
                                }
                            }
                        }
                        out[((b * out_ch + o) * oh + y) * ow + x_pos] = acc;
                    }
                }
            }
        }

        let req = x_req || w_req;
        let out_t = Self::new(out, &[batch, out_ch, oh, ow], req);
        if req {
            out_t.borrow_mut().parents = vec![input.clone(), weight.clone()];
            out_t.borrow_mut().grad_fn = Some(Box::new(Conv2dGradFn { pad_h, pad_w }));
        }
        out_t
    }
}

#[cfg(test)]
mod tests {
    use super::Padding;
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn test_valid_conv_values() {
        // 3x3 input, 2x2 ones kernel: each output cell is a window sum
        let x = RawTensor::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            &[1, 1, 3, 3],
            false,
        );
        let k = RawTensor::new(vec![1.0; 4], &[1, 1, 2, 2], false);
        let y = x.conv2d(&k, Padding::Valid);
        assert_eq!(y.borrow().shape, vec![1, 1, 2, 2]);
        assert_eq!(y.borrow().data, vec![12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn test_same_conv_shape() {
        let x = RawTensor::randn(&[2, 3, 5, 5]);
        let k = RawTensor::randn(&[4, 3, 3, 3]);
        let y = x.conv2d(&k, Padding::Same);
        assert_eq!(y.borrow().shape, vec![2, 4, 5, 5]);
    }

    #[test]
    fn test_one_by_one_conv_mixes_channels() {
        // 1x1 kernel [1, 2] collapses two channels into their weighted sum
        let x = RawTensor::new(vec![1.0, 2.0, 10.0, 20.0], &[1, 2, 1, 2], false);
        let k = RawTensor::new(vec![1.0, 2.0], &[1, 2, 1, 1], false);
        let y = x.conv2d(&k, Padding::Same);
        assert_eq!(y.borrow().shape, vec![1, 1, 1, 2]);
        assert_eq!(y.borrow().data, vec![21.0, 42.0]);
    }

    #[test]
    fn test_conv_input_gradcheck() {
        // Deterministic values keep every gradient entry well away from zero
        let x = RawTensor::new((0..32).map(|i| 0.1 * i as f32 - 1.0).collect(), &[1, 2, 4, 4], true);
        let k = RawTensor::new((0..18).map(|i| 0.05 * i as f32 + 0.1).collect(), &[1, 2, 3, 3], false);
        let passed = RawTensor::check_gradients_simple(&x, |t| t.conv2d(&k, Padding::Same).sum());
        assert!(passed);
    }

    #[test]
    fn test_conv_weight_gradcheck() {
        let x = RawTensor::new((0..16).map(|i| 0.1 * i as f32 + 0.1).collect(), &[1, 1, 4, 4], false);
        let k = RawTensor::new((0..9).map(|i| 0.2 * i as f32 - 0.8).collect(), &[1, 1, 3, 3], true);
        let passed = RawTensor::check_gradients_simple(&k, |w| x.conv2d(w, Padding::Valid).sum());
        assert!(passed);
    }
}
