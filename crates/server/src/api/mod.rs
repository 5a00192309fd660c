mod auth;
mod batches;
mod downloads;
mod error;
mod handlers;
mod library;
mod middleware;
mod playlist;
mod routes;
mod ws;

pub use error::ErrorResponse;
pub use routes::create_router;
