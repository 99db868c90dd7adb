//! Conditional output tree and its renderings

mod model;
mod node;
mod render;
mod xml;

pub use model::DataModel;
pub use node::{format_float, Alternative, ArrayKey, DataNode, Literal};
pub use render::render_ifdef;
