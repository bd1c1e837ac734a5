pub mod geo_math;
pub mod keyed_lock;
pub mod load_graph;
