use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::range_map::AddressMap;
use crate::range_map::RangeMap;
use crate::Addr;


/// A single DWARF style operation inside a parameter's location
/// program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocOp {
    /// The operation code.
    pub op: u8,
    /// The first auxiliary value, if the operation carries one.
    pub value1: u64,
    /// The second auxiliary value, if the operation carries one.
    pub value2: u64,
}

/// Metadata describing one formal parameter of a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameter {
    /// The parameter's type name as emitted by the compiler.
    pub type_name: String,
    /// The size of the type in bytes.
    pub type_size: u32,
    /// The parameter's name.
    pub name: String,
    /// The location program computing where the parameter lives.
    pub location: Vec<LocOp>,
}

/// A mapping from machine code bytes to source line and file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLine {
    /// The start address relative to the module's load address.
    pub addr: Addr,
    /// The size of this range of instructions in bytes.
    pub size: u64,
    /// The source file that generated this machine code.
    ///
    /// This is an index into [`SymbolFile`]'s file map.
    pub file: u32,
    /// The line number in `file` that generated this machine code.
    ///
    /// Zero is valid: block helper functions carry a file association
    /// but no line number.
    pub line: u32,
}

/// A source-language function.
#[derive(Debug)]
pub struct Function {
    /// The function's start address relative to the module's load
    /// address.
    pub addr: Addr,
    /// The size of the function in bytes.
    pub size: u64,
    /// The size of parameters passed to the function on the stack.
    pub parameter_size: u32,
    /// The name of the function as declared in the source.
    pub name: String,
    /// Recovery metadata for the function's parameters, in declaration
    /// order.
    pub params: Vec<Parameter>,
    /// Source line information for this function.
    pub(crate) lines: RangeMap<SourceLine>,
}

impl Function {
    pub(crate) fn find_line(&self, addr: Addr) -> Option<(&SourceLine, Addr)> {
        let (line, base, _size) = self.lines.retrieve_range(addr)?;
        Some((line, base))
    }
}

/// A publicly visible linker symbol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicSymbol {
    /// The symbol's address relative to the module's load address.
    ///
    /// Always non-zero; records with a zero address are accepted as
    /// input but never stored.
    pub addr: Addr,
    /// The name of the symbol.
    pub name: String,
    /// The size of parameters passed to the function on the stack.
    pub parameter_size: u32,
}


/// The kind of Windows stack frame information tracked by the module
/// index.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StackInfoKind {
    /// FPO_DATA style records.
    Fpo = 0,
    /// Frame data records carrying their own program string.
    FrameData = 1,
}

/// Windows unwinding data covering a range of instructions, as carried
/// by a `STACK WIN` record.
///
/// The program string, if any, is opaque to this crate; interpreting it
/// is the stack walker's business.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WindowsFrameInfo {
    /// The kind of record this data was read from, if known.
    pub kind: Option<StackInfoKind>,
    /// A bitmask of `VALID_*` flags describing which fields carry
    /// meaningful data.
    pub valid: u32,
    /// The size of the function's prologue in bytes.
    pub prologue_size: u32,
    /// The size of the function's epilogue in bytes.
    pub epilogue_size: u32,
    /// The size of the function's parameters on the stack.
    pub parameter_size: u32,
    /// The number of bytes of callee saved registers.
    pub saved_register_size: u32,
    /// The size of the function's local variables.
    pub local_size: u32,
    /// The maximum number of bytes pushed beyond the locals.
    pub max_stack_size: u32,
    /// Whether the function uses the base pointer for its frame.
    ///
    /// Only meaningful when no program string is present.
    pub allocates_base_pointer: bool,
    /// The frame program in the unwinder's postfix language, verbatim.
    pub program_string: Option<String>,
}

impl WindowsFrameInfo {
    /// No field is valid.
    pub const VALID_NONE: u32 = 0;
    /// All fields are valid.
    pub const VALID_ALL: u32 = u32::MAX;
    /// Only [`parameter_size`](Self::parameter_size) is valid.
    pub const VALID_PARAMETER_SIZE: u32 = 1;
}


/// A parsed symbol file describing a single loaded module.
///
/// A `SymbolFile` is built from a byte buffer in one pass and is
/// immutable afterwards; see [`SymbolFile::from_bytes`]. All addresses
/// held inside are relative to the module's load address.
#[derive(Debug)]
pub struct SymbolFile {
    /// The source files involved in compilation, keyed by the ids that
    /// line records reference.
    pub(crate) files: HashMap<u32, String>,
    /// Functions with known extent, possibly nested.
    pub(crate) functions: RangeMap<Function>,
    /// Linker symbols known only by name and entry address.
    pub(crate) public_symbols: AddressMap<PublicSymbol>,
    /// Windows unwinding data, one container per [`StackInfoKind`].
    pub(crate) windows_frame_info: [RangeMap<WindowsFrameInfo>; 2],
    /// CFI initial rule sets covering address ranges.
    pub(crate) cfi_initial_rules: RangeMap<String>,
    /// CFI delta rules, each refining the rule set from its address on.
    pub(crate) cfi_delta_rules: BTreeMap<Addr, String>,
    /// Whether any parse error was encountered while loading.
    pub(crate) is_corrupt: bool,
}

impl SymbolFile {
    /// Whether the symbol data contained malformed records.
    ///
    /// A corrupt module is still usable; offending records were merely
    /// skipped.
    #[inline]
    pub fn is_corrupt(&self) -> bool {
        self.is_corrupt
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Exercise the `Debug` representation of various types.
    #[test]
    fn debug_repr() {
        let file = SymbolFile {
            files: HashMap::new(),
            functions: RangeMap::default(),
            public_symbols: AddressMap::default(),
            windows_frame_info: Default::default(),
            cfi_initial_rules: RangeMap::default(),
            cfi_delta_rules: BTreeMap::new(),
            is_corrupt: false,
        };
        assert_ne!(format!("{file:?}"), "");

        let info = WindowsFrameInfo {
            kind: Some(StackInfoKind::FrameData),
            ..Default::default()
        };
        assert_ne!(format!("{info:?}"), "");
    }
}
