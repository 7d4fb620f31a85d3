//! Request/response protocol server exposing `tools/list` and `tools/call`.

mod messages;
mod server;

pub use messages::*;
pub use server::*;
