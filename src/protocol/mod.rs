pub mod bind;
pub mod block;
pub mod connect;
pub mod frame;
pub mod primitive;
pub mod query;
pub mod schemaless;
pub mod stmt;

pub use bind::{BindBuffer, Param, encode_bind_buffers};
pub use block::{ResultBlock, decode_block};
pub use frame::{Command, Response};
