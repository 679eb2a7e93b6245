//! Bearer-token authentication for list mutations.

mod middleware;

pub use middleware::AuthUser;
