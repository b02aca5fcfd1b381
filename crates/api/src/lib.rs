pub mod cache;
pub mod dto;
pub mod routes;
pub mod server;

pub use routes::AppState;
