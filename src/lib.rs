//! A library for resolving Breakpad call frame information (CFI).
//!
//! Stack walking a crashed process needs to know, for every
//! instruction, how to recover the values the CPU registers had in the
//! calling frame. Breakpad symbol files describe this in `STACK CFI`
//! records; this crate loads those records and answers the question
//! "which register recovery rules are in effect at this instruction?".
#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations, missing_docs)]
#![deny(unsafe_code)]

mod error;
mod log;
mod module;
mod parser;
mod resolver;
mod rules;
mod types;
mod util;

pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoCowStr;
pub use crate::error::Result;
pub use crate::module::Module;
pub use crate::resolver::CfiResolver;
pub use crate::resolver::StackFrame;
pub use crate::rules::RuleSet;

/// A type identifying an address in a process' virtual address space.
pub type Addr = u64;
