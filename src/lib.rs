//! crashsym resolves instruction addresses against Breakpad style
//! symbol files: function names, source lines, unwinding rules, and
//! recovered parameter values for post-mortem crash analysis.
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod cfi;
mod error;
mod eval;
mod log;
mod parser;
mod range_map;
mod resolver;
mod types;
mod util;

pub use crate::cfi::CfiFrameInfo;
pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::Result;
pub use crate::resolver::ParamValue;
pub use crate::resolver::ResolvedFrame;
pub use crate::types::Function;
pub use crate::types::LocOp;
pub use crate::types::Parameter;
pub use crate::types::PublicSymbol;
pub use crate::types::SourceLine;
pub use crate::types::StackInfoKind;
pub use crate::types::SymbolFile;
pub use crate::types::WindowsFrameInfo;


/// A type representing addresses.
pub type Addr = u64;


/// A view of the register state of the stack frame being resolved.
///
/// The resolver consults it only while recovering parameter values.
/// Implementations are provided by the stack walker driving the
/// resolution.
pub trait FrameView {
    /// Read the value of the register with the given DWARF register
    /// number. Unknown registers read as zero.
    fn register(&self, reg: u64) -> u64;

    /// Read the frame's base address. Zero signals that the frame base
    /// is unknown.
    fn frame_base(&self) -> u64;
}

/// Read access to the memory of the crashed process, typically backed
/// by the stack and heap regions captured in a minidump.
pub trait MemoryView {
    /// Read the byte at `addr`, if mapped.
    fn read_u8(&self, addr: Addr) -> Option<u8>;

    /// Read the little-endian 64 bit word at `addr`, if mapped.
    fn read_u64(&self, addr: Addr) -> Option<u64>;
}
