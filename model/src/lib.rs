//! Layer graphs whose forward pass can be traced over shapes, one hook call per layer call.

mod error;
pub mod graph;
pub mod layers;
pub mod shape;
pub mod spec;
pub mod zoo;

pub use error::{ModelErr, Result};
pub use graph::{ForwardHook, LayerEntry, LayerId, Merge, Network, NetworkBuilder, Node};
pub use layers::Layer;
pub use shape::{Shape, numel, shape};
pub use spec::NetworkSpec;
