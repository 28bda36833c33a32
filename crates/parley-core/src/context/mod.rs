pub mod assembler;
pub mod window;
