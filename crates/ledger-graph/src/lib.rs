pub mod algorithms;
pub mod view;

pub use algorithms::{best_parent, determine_if_included, witnessed_level, GraphError, Inclusion};
pub use view::GraphView;
