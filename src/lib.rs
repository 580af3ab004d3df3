pub mod col;
pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
pub mod reqid;
pub mod value;

pub use opts::Opts;

#[cfg(feature = "tokio")]
pub mod tokio;
