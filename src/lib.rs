#![doc = include_str!("../README.md")]

mod error;
mod library;
mod os;
mod registry;

pub use error::Error;
pub use library::{AutoReload, DynamicLibrary};
pub use registry::LibraryRegistry;
