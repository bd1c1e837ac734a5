pub mod eta;
pub mod live_state;
pub mod route_graph;
