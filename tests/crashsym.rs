//! End-to-end tests against the public API.

use crashsym::Addr;
use crashsym::FrameView;
use crashsym::MemoryView;
use crashsym::StackInfoKind;
use crashsym::SymbolFile;
use crashsym::WindowsFrameInfo;


/// A symbol file with one of everything.
const SYMBOLS: &[u8] = b"\
MODULE windows x86_64 D3096ED481217FD4C16B29CD9BC208BA0 app.pdb
INFO CODE_ID 18DA9C31B7D1C2FD app.exe
FILE 1 hello.cc
FILE 2 util.cc
FUNC 100 20 8 f
100 10 42 1
110 10 43 1
FUNC 300 10 0 h # 1 # int@4@x@53
300 10 12 2
PUBLIC 200 4 g
STACK WIN 4 100 20 3 1 8 4 10 0 1 $T0 $ebp = $eip $T0 4 + ^ =
STACK CFI INIT 1000 100 .cfa: rsp 8 +
STACK CFI 1010 rip: .cfa -8 +
STACK CFI 1040 rbp: .cfa -16 +
";

const MODULE_BASE: Addr = 0x0110_0000;

struct Registers {
    regs: [u64; 32],
    frame_base: u64,
}

impl FrameView for Registers {
    fn register(&self, reg: u64) -> u64 {
        self.regs.get(reg as usize).copied().unwrap_or(0)
    }

    fn frame_base(&self) -> u64 {
        self.frame_base
    }
}

struct Memory {
    base: u64,
    bytes: Vec<u8>,
}

impl MemoryView for Memory {
    fn read_u8(&self, addr: u64) -> Option<u8> {
        let offset = addr.checked_sub(self.base)? as usize;
        self.bytes.get(offset).copied()
    }

    fn read_u64(&self, addr: u64) -> Option<u64> {
        let offset = addr.checked_sub(self.base)? as usize;
        let bytes = self.bytes.get(offset..offset + 8)?;
        Some(u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

fn symbol_file() -> SymbolFile {
    SymbolFile::from_bytes(SYMBOLS).unwrap()
}


/// An address inside a FUNC record resolves to function, file, and
/// line, all bases made module-absolute.
#[test]
fn resolve_function_and_line() {
    let symbols = symbol_file();
    assert!(!symbols.is_corrupt());

    let frame = symbols.lookup_address(MODULE_BASE, MODULE_BASE + 0x105, None, None);
    assert_eq!(frame.function_name, Some("f"));
    assert_eq!(frame.function_base, Some(MODULE_BASE + 0x100));
    assert_eq!(frame.source_file_name, Some("hello.cc"));
    assert_eq!(frame.source_line, Some(42));
    assert_eq!(frame.source_line_base, Some(MODULE_BASE + 0x100));
}

/// An address known only through a PUBLIC record resolves to the bare
/// symbol.
#[test]
fn resolve_public_symbol() {
    let symbols = symbol_file();

    let frame = symbols.lookup_address(MODULE_BASE, MODULE_BASE + 0x200, None, None);
    assert_eq!(frame.function_name, Some("g"));
    assert_eq!(frame.function_base, Some(MODULE_BASE + 0x200));
    assert_eq!(frame.source_file_name, None);
    assert_eq!(frame.source_line, None);
}

/// An address covered by nothing resolves to nothing: the preceding
/// function bounds the public symbol lookup.
#[test]
fn resolve_nothing_between_symbols() {
    let symbols = symbol_file();

    let frame = symbols.lookup_address(MODULE_BASE, MODULE_BASE + 0x125, None, None);
    assert_eq!(frame.function_name, None);
    assert_eq!(frame.function_base, None);
    assert_eq!(frame.source_line, None);
    assert!(frame.params.is_empty());
}

/// With frame and memory views supplied, parameter values are
/// recovered through their location programs.
#[test]
fn resolve_with_parameter_recovery() {
    let symbols = symbol_file();

    let mut regs = [0u64; 32];
    // DW_OP_reg3, where the parameter lives.
    regs[3] = 0xdeadbeef;
    let registers = Registers {
        regs,
        frame_base: 0x7fff_0000,
    };
    let memory = Memory {
        base: 0xdeadbeef,
        bytes: 7u64.to_le_bytes().to_vec(),
    };

    let frame = symbols.lookup_address(
        MODULE_BASE,
        MODULE_BASE + 0x305,
        Some(&registers),
        Some(&memory),
    );
    assert_eq!(frame.function_name, Some("h"));
    assert_eq!(frame.source_line, Some(12));
    assert_eq!(frame.params.len(), 1);
    assert_eq!(frame.params[0].name, "x");
    assert_eq!(frame.params[0].type_name, "int");
    assert_eq!(frame.params[0].type_size, 4);
    assert_eq!(frame.params[0].value, "0x7, hex:7 0 0 0");

    // Without the views the same lookup just skips the parameters.
    let frame = symbols.lookup_address(MODULE_BASE, MODULE_BASE + 0x305, None, None);
    assert_eq!(frame.function_name, Some("h"));
    assert!(frame.params.is_empty());
}

/// STACK WIN data is found by range, with a function's parameter size
/// as the fallback.
#[test]
fn windows_frame_info() {
    let symbols = symbol_file();

    let info = symbols
        .find_windows_frame_info(MODULE_BASE, MODULE_BASE + 0x110)
        .unwrap();
    assert_eq!(info.kind, Some(StackInfoKind::FrameData));
    assert_eq!(info.valid, WindowsFrameInfo::VALID_ALL);
    assert_eq!(
        info.program_string.as_deref(),
        Some("$T0 $ebp = $eip $T0 4 + ^ =")
    );

    // `h` has no STACK WIN record; its stack_param_size of 0 is still
    // reported as valid.
    let info = symbols
        .find_windows_frame_info(MODULE_BASE, MODULE_BASE + 0x305)
        .unwrap();
    assert_eq!(info.kind, None);
    assert_eq!(info.valid, WindowsFrameInfo::VALID_PARAMETER_SIZE);
    assert_eq!(info.parameter_size, 0);

    assert_eq!(
        symbols.find_windows_frame_info(MODULE_BASE, MODULE_BASE + 0x500),
        None
    );
}

/// CFI rule sets compose the initial rules with all deltas at or
/// before the queried address.
#[test]
fn cfi_frame_info() {
    let symbols = symbol_file();

    let rules = symbols
        .find_cfi_frame_info(MODULE_BASE, MODULE_BASE + 0x1030)
        .unwrap();
    assert_eq!(rules.cfa_rule, "rsp 8 +");
    assert_eq!(rules.register_rules["rip"], ".cfa -8 +");
    assert!(!rules.register_rules.contains_key("rbp"));

    let rules = symbols
        .find_cfi_frame_info(MODULE_BASE, MODULE_BASE + 0x1050)
        .unwrap();
    assert_eq!(rules.register_rules["rip"], ".cfa -8 +");
    assert_eq!(rules.register_rules["rbp"], ".cfa -16 +");

    // The composed rule set serializes back into a parseable rule
    // string.
    assert_eq!(
        rules.to_string(),
        ".cfa: rsp 8 + rbp: .cfa -16 + rip: .cfa -8 +"
    );

    assert_eq!(
        symbols.find_cfi_frame_info(MODULE_BASE, MODULE_BASE + 0x2000),
        None
    );
}

/// Symbol data with interior null bytes and malformed records loads,
/// is flagged corrupt, and remains queryable.
#[test]
fn corrupt_module_remains_usable() {
    let mut data = Vec::new();
    data.extend_from_slice(b"FUNC 1 1 0 f\n");
    data.push(0);
    data.extend_from_slice(b"FUNC 2 1 0 g\nGARBAGE\n");

    let symbols = SymbolFile::from_bytes(&data).unwrap();
    assert!(symbols.is_corrupt());

    let frame = symbols.lookup_address(0, 0x1, None, None);
    assert_eq!(frame.function_name, Some("f"));
    let frame = symbols.lookup_address(0, 0x2, None, None);
    assert_eq!(frame.function_name, Some("g"));
}
