pub extern crate serde;
pub extern crate serde_json;

mod language;
mod message;
mod types;

pub use language::*;
pub use message::*;
pub use types::*;
