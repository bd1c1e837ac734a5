pub mod dijkstra;

pub use dijkstra::shortest_path;
