pub mod config;
pub mod error;
pub mod release;
pub mod stamp;
pub mod watchlist;

pub use config::Config;
pub use error::*;
pub use release::*;
pub use watchlist::*;
