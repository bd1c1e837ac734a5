pub mod _structs;
pub mod buses;
pub mod messages;
pub mod pickups;
pub mod routes;
