mod conn;
mod cursor;
pub mod framed;
mod mux;
mod session;

pub use crate::reqid::ReqIdGenerator;
pub use conn::Conn;
pub use cursor::ResultCursor;
pub use mux::Multiplexer;
pub use session::{PreparedHandle, PreparedState, QueryOptions, Statement};
