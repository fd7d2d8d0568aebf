pub mod seed;

pub use seed::{SeedCommand, handle_seed};
