//! Static shape propagation for graph construction.
//!
//! Every stage of the model computes its output shape here *before* the
//! corresponding tensor op runs, so inconsistent architectures surface as
//! typed [`UpresError`](crate::UpresError) values at build time rather than
//! as panics deep inside the op layer.

use crate::error::{Result, UpresError};
use crate::ops::Padding;

/// (batch, channels, height, width)
pub type ImageDims = (usize, usize, usize, usize);

/// Validate that a shape describes a 4D image batch
pub fn image_batch(shape: &[usize]) -> Result<ImageDims> {
    match shape {
        [b, c, h, w] => Ok((*b, *c, *h, *w)),
        _ => Err(UpresError::NotAnImageBatch {
            shape: shape.to_vec(),
        }),
    }
}

/// Output dims of a stride-1 conv with kernel shape `[out, in, kh, kw]`
pub fn conv2d_out(
    stage: &'static str,
    input: ImageDims,
    weight: [usize; 4],
    padding: Padding,
) -> Result<ImageDims> {
    let (batch, channels, height, width) = input;
    let [out_ch, in_ch, kh, kw] = weight;

    if channels != in_ch {
        return Err(UpresError::ChannelMismatch {
            stage,
            expected: in_ch,
            actual: channels,
        });
    }

    match padding {
        Padding::Valid => {
            if kh > height || kw > width {
                return Err(UpresError::KernelTooLarge {
                    stage,
                    kernel: kh.max(kw),
                    height,
                    width,
                });
            }
            Ok((batch, out_ch, height - kh + 1, width - kw + 1))
        }
        Padding::Same => {
            if kh % 2 == 0 || kw % 2 == 0 {
                return Err(UpresError::InvalidConfig(format!(
                    "{stage}: same padding requires odd kernels, got {kh}x{kw}"
                )));
            }
            Ok((batch, out_ch, height, width))
        }
    }
}

/// Output dims of a depth-to-space rearrangement
pub fn depth_to_space_out(stage: &'static str, input: ImageDims, scale: usize) -> Result<ImageDims> {
    let (batch, channels, height, width) = input;
    if scale == 0 {
        return Err(UpresError::InvalidConfig(format!(
            "{stage}: scale must be positive"
        )));
    }
    let block = scale * scale;
    if channels % block != 0 {
        return Err(UpresError::InvalidConfig(format!(
            "{stage}: {channels} channels are not divisible by scale²={block}"
        )));
    }
    Ok((batch, channels / block, height * scale, width * scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_conv_shrinks() {
        let out = conv2d_out("features", (2, 1, 20, 20), [56, 1, 5, 5], Padding::Valid).unwrap();
        assert_eq!(out, (2, 56, 16, 16));
    }

    #[test]
    fn test_same_conv_keeps_spatial() {
        let out = conv2d_out("mapping", (2, 12, 16, 16), [12, 12, 3, 3], Padding::Same).unwrap();
        assert_eq!(out, (2, 12, 16, 16));
    }

    #[test]
    fn test_channel_mismatch() {
        let err = conv2d_out("shrink", (1, 8, 16, 16), [12, 56, 1, 1], Padding::Same).unwrap_err();
        assert!(matches!(
            err,
            UpresError::ChannelMismatch {
                expected: 56,
                actual: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_kernel_too_large() {
        let err = conv2d_out("features", (1, 1, 4, 4), [8, 1, 7, 7], Padding::Valid).unwrap_err();
        assert!(matches!(err, UpresError::KernelTooLarge { kernel: 7, .. }));
    }

    #[test]
    fn test_depth_to_space_divisibility() {
        assert_eq!(
            depth_to_space_out("subpixel", (1, 4, 16, 16), 2).unwrap(),
            (1, 1, 32, 32)
        );
        assert!(depth_to_space_out("subpixel", (1, 6, 16, 16), 2).is_err());
    }

    #[test]
    fn test_rank_validation() {
        assert!(image_batch(&[2, 1, 20, 20]).is_ok());
        assert!(matches!(
            image_batch(&[20, 20]),
            Err(UpresError::NotAnImageBatch { .. })
        ));
    }
}
