//! Token authentication

mod token;

pub use token::{Claims, TokenService};
