use crate::error::{Result, UpresError};
use crate::ops::{Padding, depth_to_space};
use crate::params::{Init, ParamStore};
use crate::shape;
use crate::tensor::{RawTensor, Tensor, TensorOps};
use log::debug;

/// Construction contract for a [`Model`]
///
/// All fields are fixed once the model is created. `images` is the
/// low-resolution input batch the graph is built over, shaped
/// `[batch, 1, image_size, image_size]`. The feature-extraction kernel spans
/// `padding + 1` pixels and runs without padding, so the network shrinks the
/// input by `padding` before upscaling; `label_size` must equal
/// `(image_size − padding) · scale`.
pub struct Config {
    pub scale: usize,
    pub radius: usize,
    pub padding: usize,
    pub batch: usize,
    pub image_size: usize,
    pub label_size: usize,
    pub images: Tensor,
}

/// Architecture parameters (d, s, m, r)
///
/// * `d` - feature-extraction channel width
/// * `s` - shrunk channel width; 0 disables the shrink/expand stages
/// * `m` - number of 3×3 mapping layers
/// * `r` - mapping-block repetitions (weight-shared)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetParams {
    pub d: usize,
    pub s: usize,
    pub m: usize,
    pub r: usize,
}

impl NetParams {
    /// Full-size preset
    pub const fn full() -> Self {
        NetParams { d: 56, s: 12, m: 4, r: 1 }
    }

    /// Lighter preset that trades accuracy for speed
    pub const fn fast() -> Self {
        NetParams { d: 32, s: 5, m: 1, r: 1 }
    }
}

/// Super-resolution network: graph builder plus its parameter store
///
/// `model(fast)` assembles the forward graph over `config.images` and returns
/// the high-resolution output tensor; `loss(y, x)` assembles the edge-aware
/// training objective. The learned tensors live in the owned [`ParamStore`]
/// and are handed to an external optimizer via [`ParamStore::parameters`].
pub struct Model {
    config: Config,
    net: NetParams,
    store: ParamStore,
}

impl Model {
    pub fn new(config: Config) -> Self {
        Model {
            config,
            net: NetParams::full(),
            store: ParamStore::new(),
        }
    }

    /// The learned parameters created so far
    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    /// Build the forward graph using the preset architecture
    ///
    /// `fast` switches to the lighter preset before building.
    pub fn model(&mut self, fast: bool) -> Result<Tensor> {
        if fast {
            self.net = NetParams::fast();
        }
        self.build(self.net)
    }

    /// Build the forward graph with explicit architecture parameters
    ///
    /// Stages run in fixed order: feature extraction, shrinking (when s > 0),
    /// the repeated residual mapping block, expanding (when s > 0), and
    /// sub-pixel reconstruction. Shapes are propagated statically ahead of
    /// every stage, so an inconsistent architecture comes back as a typed
    /// error before any tensor math runs.
    pub fn build(&mut self, net: NetParams) -> Result<Tensor> {
        let NetParams { d, s, m, r } = net;
        if d == 0 || m == 0 || r == 0 {
            return Err(UpresError::InvalidConfig(format!(
                "network parameters must be positive, got d={d} m={m} r={r}"
            )));
        }
        let scale = self.config.scale;
        if scale == 0 {
            return Err(UpresError::InvalidConfig("scale must be positive".into()));
        }

        let images = self.config.images.clone();
        let input_shape = images.borrow().shape.clone();
        let mut dims = shape::image_batch(&input_shape)?;
        if dims.0 != self.config.batch
            || dims.2 != self.config.image_size
            || dims.3 != self.config.image_size
        {
            return Err(UpresError::InvalidConfig(format!(
                "input {input_shape:?} does not match batch={} image_size={}",
                self.config.batch, self.config.image_size
            )));
        }

        let store = &mut self.store;

        // ----- feature extraction -----
        let kernel = self.config.padding + 1;
        dims = shape::conv2d_out("features", dims, [d, 1, kernel, kernel], Padding::Valid)?;
        let weight = store.get_or_init(
            "features/w",
            &[d, 1, kernel, kernel],
            Init::HeNormal { gain: 1.0 },
        )?;
        let bias = store.get_or_init("features/b", &[d], Init::Zeros)?;
        let mut features = bias_add(&images.conv2d(&weight, Padding::Valid), &bias, d);
        debug!("features: {dims:?}");

        // ----- shrinking -----
        let width = if s > 0 { s } else { d };
        if s > 0 {
            features = prelu(store, &features, "shrink/alpha")?;
            dims = shape::conv2d_out("shrink", dims, [s, d, 1, 1], Padding::Same)?;
            let weight =
                store.get_or_init("shrink/w", &[s, d, 1, 1], Init::HeNormal { gain: 1.0 })?;
            let bias = store.get_or_init("shrink/b", &[s], Init::Zeros)?;
            features = bias_add(&features.conv2d(&weight, Padding::Same), &bias, s);
            debug!("shrink: {dims:?}");
        }

        // ----- mapping -----
        // Every repetition reuses the same store entries and adds back the
        // same post-shrink anchor (repetitions do not chain their residuals).
        let mut conv = features.clone();
        for _ in 0..r {
            for i in 3..=m + 2 {
                if i > 3 {
                    conv = prelu(store, &conv, &format!("mapping/alpha{i}"))?;
                }
                dims = shape::conv2d_out("mapping", dims, [width, width, 3, 3], Padding::Same)?;
                let weight = store.get_or_init(
                    &format!("mapping/w{i}"),
                    &[width, width, 3, 3],
                    Init::HeNormal { gain: 1.0 },
                )?;
                let bias = store.get_or_init(&format!("mapping/b{i}"), &[width], Init::Zeros)?;
                conv = bias_add(&conv.conv2d(&weight, Padding::Same), &bias, width);

                if i == m + 2 {
                    // 1×1 bridge back onto the residual anchor
                    conv = prelu(store, &conv, &format!("mapping/alpha{}", m + 3))?;
                    dims =
                        shape::conv2d_out("mapping", dims, [width, width, 1, 1], Padding::Same)?;
                    let weight = store.get_or_init(
                        &format!("mapping/w{}", m + 3),
                        &[width, width, 1, 1],
                        Init::HeNormal { gain: 1.0 },
                    )?;
                    let bias =
                        store.get_or_init(&format!("mapping/b{}", m + 3), &[width], Init::Zeros)?;
                    conv = bias_add(&conv.conv2d(&weight, Padding::Same), &bias, width);
                    conv = conv.add(&features);
                }
            }
        }
        conv = prelu(store, &conv, "mapping/alpha_out")?;
        debug!("mapping: {dims:?}");

        // ----- expanding -----
        if s > 0 {
            dims = shape::conv2d_out("expand", dims, [d, width, 1, 1], Padding::Same)?;
            let weight =
                store.get_or_init("expand/w", &[d, width, 1, 1], Init::HeNormal { gain: 1.0 })?;
            let bias = store.get_or_init("expand/b", &[d], Init::Zeros)?;
            conv = bias_add(&conv.conv2d(&weight, Padding::Same), &bias, d);
            conv = prelu(store, &conv, "expand/alpha")?;
            debug!("expand: {dims:?}");
        }

        // ----- sub-pixel reconstruction -----
        let kernel = 2 * self.config.radius + 1;
        let block = scale * scale;
        dims = shape::conv2d_out("subpixel", dims, [block, d, kernel, kernel], Padding::Same)?;
        let weight = store.get_or_init(
            "subpixel/w",
            &[block, d, kernel, kernel],
            // Small-scale initialization keeps the reconstruction close to
            // zero early in training
            Init::HeNormal { gain: 0.01 },
        )?;
        let bias = store.get_or_init("subpixel/b", &[block], Init::Zeros)?;
        conv = bias_add(&conv.conv2d(&weight, Padding::Same), &bias, block);
        dims = shape::depth_to_space_out("subpixel", dims, scale)?;
        let output = depth_to_space(&conv, scale);
        debug!("subpixel: {dims:?}");

        if dims.2 != self.config.label_size || dims.3 != self.config.label_size {
            return Err(UpresError::InvalidConfig(format!(
                "reconstruction produces a {}x{} output, label_size is {}",
                dims.2, dims.3, self.config.label_size
            )));
        }

        debug!("built graph with {} parameters", self.store.len());
        Ok(output)
    }

    /// Edge-aware training loss between a reference batch `y` and a
    /// prediction batch `x`
    ///
    /// Computes `mean|∇y − ∇x| + 2·mean|(1−M)·y − (1−M)·x|` where ∇ is the
    /// fixed Sobel operator and M the magnitude of `y`'s gradients: pixel
    /// error is down-weighted near strong edges while the gradient term
    /// keeps the edges themselves aligned. Identical inputs give exactly 0.
    pub fn loss(&self, y: &Tensor, x: &Tensor) -> Result<Tensor> {
        let y_shape = y.borrow().shape.clone();
        let x_shape = x.borrow().shape.clone();
        let (_, channels, _, _) = shape::image_batch(&y_shape)?;
        shape::image_batch(&x_shape)?;
        if y_shape != x_shape {
            return Err(UpresError::ShapeMismatch {
                expected: y_shape,
                actual: x_shape,
            });
        }
        if channels != 1 {
            return Err(UpresError::ChannelMismatch {
                stage: "loss",
                expected: 1,
                actual: channels,
            });
        }

        let y_edges = sobel_edges(y);
        let x_edges = sobel_edges(x);

        // Edge magnitude of the reference image
        let magnitude = y_edges.elem_mul(&y_edges).sum_dim(1, true).sqrt();
        let mask = RawTensor::constant(1.0, &[1]).sub(&magnitude);

        let edge_term = mean_abs_diff(&y_edges, &x_edges);
        let pixel_term = mean_abs_diff(&mask.elem_mul(y), &mask.elem_mul(x));

        Ok(edge_term.add(&RawTensor::constant(2.0, &[1]).elem_mul(&pixel_term)))
    }
}

/// Parametric ReLU with a learned per-channel negative slope
///
/// Fetches (or reuses) a `[channels]` slope vector under `name`, initialized
/// to 0.2, and emits `relu(x) − alpha·relu(−x)`. Call sites that pass the
/// same name share one slope vector.
pub fn prelu(store: &mut ParamStore, x: &Tensor, name: &str) -> Result<Tensor> {
    let channels = {
        let t = x.borrow();
        shape::image_batch(&t.shape)?.1
    };
    let alpha = store.get_or_init(name, &[channels], Init::Const(0.2))?;
    let alpha = alpha.reshape(&[1, channels, 1, 1]);
    Ok(x.relu().sub(&alpha.elem_mul(&x.neg().relu())))
}

/// Broadcast a `[channels]` bias over an NCHW batch
fn bias_add(x: &Tensor, bias: &Tensor, channels: usize) -> Tensor {
    x.add(&bias.reshape(&[1, channels, 1, 1]))
}

// Vertical- then horizontal-gradient kernels; fixed, never learned.
const SOBEL_VERTICAL: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
const SOBEL_HORIZONTAL: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];

/// Sobel gradient maps of a single-channel batch
///
/// Returns a `(B, 2, H, W)` tensor, vertical gradient first. The input is
/// reflection-padded so the maps keep its spatial size.
fn sobel_edges(x: &Tensor) -> Tensor {
    let mut kernels = Vec::with_capacity(18);
    kernels.extend_from_slice(&SOBEL_VERTICAL);
    kernels.extend_from_slice(&SOBEL_HORIZONTAL);
    let weight = RawTensor::from_vec(kernels, &[2, 1, 3, 3]);
    x.reflect_pad(1).conv2d(&weight, Padding::Valid)
}

fn mean_abs_diff(a: &Tensor, b: &Tensor) -> Tensor {
    a.sub(b).abs().mean()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelu_learned_slope() {
        let mut store = ParamStore::new();
        let x = RawTensor::from_vec(vec![-1.0, 0.5, 2.0, -2.0], &[1, 1, 2, 2]);
        let y = prelu(&mut store, &x, "alpha").unwrap();
        assert_eq!(y.borrow().data, vec![-0.2, 0.5, 2.0, -0.4]);

        // The slope is a learned parameter: change it and the activation follows
        store.get("alpha").unwrap().borrow_mut().data = vec![0.5];
        let y = prelu(&mut store, &x, "alpha").unwrap();
        assert_eq!(y.borrow().data, vec![-0.5, 0.5, 2.0, -1.0]);
    }

    #[test]
    fn test_prelu_slope_is_per_channel() {
        let mut store = ParamStore::new();
        let x = RawTensor::from_vec(vec![-1.0, -1.0], &[1, 2, 1, 1]);
        prelu(&mut store, &x, "alpha").unwrap();
        store.get("alpha").unwrap().borrow_mut().data = vec![0.0, 1.0];
        let y = prelu(&mut store, &x, "alpha").unwrap();
        assert_eq!(y.borrow().data, vec![0.0, -1.0]);
    }

    #[test]
    fn test_sobel_constant_image_has_no_edges() {
        let x = RawTensor::constant(3.0, &[1, 1, 5, 5]);
        let edges = sobel_edges(&x);
        assert_eq!(edges.borrow().shape, vec![1, 2, 5, 5]);
        assert!(edges.borrow().data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sobel_vertical_ramp() {
        // Row index as intensity: constant vertical gradient in the interior,
        // zero horizontal gradient everywhere
        let mut data = Vec::with_capacity(25);
        for y in 0..5 {
            for _ in 0..5 {
                data.push(y as f32);
            }
        }
        let x = RawTensor::from_vec(data, &[1, 1, 5, 5]);
        let edges = sobel_edges(&x);
        let edges = edges.borrow();

        // Vertical channel, center pixel: 4·(y+1) − 4·(y−1) = 8
        assert_eq!(edges.data[2 * 5 + 2], 8.0);
        // Horizontal channel is identically zero
        assert!(edges.data[25..].iter().all(|&v| v == 0.0));
    }
}
