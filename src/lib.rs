//! Fast super-resolution network with an edge-aware training loss.
//!
//! The crate has two layers:
//!
//! - a small CPU autograd engine ([`tensor`], [`autograd`], [`ops`]):
//!   `Rc<RefCell<RawTensor>>` tensors recording a dynamic computation graph,
//!   with reverse-mode differentiation over the op set the network needs;
//! - the model layer ([`model`], [`params`], [`shape`]): a five-stage
//!   sub-pixel super-resolution graph builder with an explicit parameter
//!   store and statically validated shapes, plus the Sobel edge-aware loss.
//!
//! Training itself (optimizer, data, checkpoints) is left to the caller:
//! build the graph with [`Model::model`], feed input through
//! `config.images`, run [`Model::loss`] and `backward()`, and update
//! [`ParamStore::parameters`] externally.

pub mod autograd;
pub mod error;
pub mod model;
pub mod ops;
pub mod params;
pub mod shape;
pub mod tensor;

pub use error::{Result, UpresError};
pub use model::{Config, Model, NetParams, prelu};
pub use ops::{Padding, depth_to_space};
pub use params::{Init, ParamStore};
pub use tensor::{RawTensor, Tensor, TensorOps};
