//! A small JVM: class file parsing, class linking and a bytecode interpreter.
pub mod attribute;
pub mod bytecode;
pub mod class;
pub mod constant_pool;
pub mod descriptor;
pub mod error;
pub mod jvm;
pub mod native;
pub mod reader;
pub mod registry;
pub mod runtime;
pub mod value;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{Error, Result};
