//! Domain models: nodes, edges, and nested property bags.

mod edge;
mod node;
mod properties;

pub use edge::Edge;
pub use node::Node;
pub use properties::{Properties, PropertyValue};
