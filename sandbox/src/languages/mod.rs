mod javascript;
mod python;
mod typescript;

pub use javascript::ScriptContextStrategy;
pub use python::InterpreterStrategy;
pub use typescript::TranspiledStrategy;
