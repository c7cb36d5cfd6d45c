pub mod config;
pub mod emulator;
pub mod isa;
mod utils;
