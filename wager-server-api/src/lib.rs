mod client;
mod jwt;
mod protocol;

pub use client::{TransportServiceImpl, TransportSettings};
pub use jwt::{Claims, JwtIdentityResolver};
