pub mod backends;
pub mod queries;
