//! Root sources owned by the runtime: the operand stack and the pin table.

pub mod locks;
pub mod stack;

pub use locks::PinTable;
pub use stack::Stack;
