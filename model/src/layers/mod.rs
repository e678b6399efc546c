mod activation;
mod attention;
mod conv;
mod layer;
mod linear;
mod misc;
mod norm;
mod pool;
mod recurrent;
mod upsample;

pub use activation::Activation;
pub use attention::MultiheadAttention;
pub use conv::Conv;
pub use layer::Layer;
pub use linear::Linear;
pub use misc::{Custom, Embedding, Flatten};
pub use norm::{ChannelNorm, LayerNorm, NormKind};
pub use pool::{Pool, PoolKind};
pub use recurrent::{Cell, Recurrent, RecurrentCell};
pub use upsample::Upsample;
