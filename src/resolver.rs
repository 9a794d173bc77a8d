//! Address resolution against a loaded [`SymbolFile`].

use crate::cfi::CfiFrameInfo;
use crate::eval::recover_parameters;
use crate::types::StackInfoKind;
use crate::types::SymbolFile;
use crate::types::WindowsFrameInfo;
use crate::Addr;
use crate::FrameView;
use crate::MemoryView;


/// The recovered value of a single function parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamValue<'sym> {
    /// The parameter's type name.
    pub type_name: &'sym str,
    /// The size of the parameter's type in bytes.
    pub type_size: u32,
    /// The parameter's name.
    pub name: &'sym str,
    /// The formatted value: the typed rendering (for pointer, floating
    /// point, and even-sized integral types), followed by a hex dump of
    /// the type's raw bytes. Empty for parameters without a size.
    pub value: String,
}


/// The source level attribution of a single instruction address.
///
/// Evidence that could not be found is simply absent; resolution never
/// fails as such. Name fields borrow from the [`SymbolFile`] the lookup
/// was performed on.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct ResolvedFrame<'sym> {
    /// The name of the function containing the instruction, from
    /// either a `FUNC` or a `PUBLIC` record.
    pub function_name: Option<&'sym str>,
    /// The module-absolute address the function starts at.
    pub function_base: Option<Addr>,
    /// The name of the source file containing the instruction.
    pub source_file_name: Option<&'sym str>,
    /// The source line the instruction was generated from.
    pub source_line: Option<u32>,
    /// The module-absolute address at which the instructions of
    /// `source_line` start.
    pub source_line_base: Option<Addr>,
    /// Recovered parameter values, if frame and memory views were
    /// supplied and the function carries parameter metadata.
    pub params: Vec<ParamValue<'sym>>,
}


impl SymbolFile {
    /// Resolve `instruction` to the function and source line containing
    /// it.
    ///
    /// `module_base` is the address the module was loaded at; all
    /// symbol data is kept module-relative and the bases reported back
    /// are made absolute again. `frame` and `memory` are only consulted
    /// for parameter recovery and may be absent.
    pub fn lookup_address<'slf>(
        &'slf self,
        module_base: Addr,
        instruction: Addr,
        frame: Option<&dyn FrameView>,
        memory: Option<&dyn MemoryView>,
    ) -> ResolvedFrame<'slf> {
        let address = instruction.wrapping_sub(module_base);
        let mut resolved = ResolvedFrame::default();

        // Look for a FUNC record covering the address. Retrieving the
        // nearest range instead of a covering one means that on a miss
        // the function still bounds the extent of the PUBLIC symbol
        // below; it also means the coverage check is ours to make.
        if let Some((func, func_base, func_size)) = self.functions.retrieve_nearest(address) {
            if address >= func_base && address - func_base < func_size {
                resolved.function_name = Some(func.name.as_str());
                resolved.function_base = Some(module_base.wrapping_add(func_base));

                if let (Some(frame), Some(memory)) = (frame, memory) {
                    if !func.params.is_empty() {
                        resolved.params = recover_parameters(frame, memory, func);
                    }
                }

                if let Some((line, line_base)) = func.find_line(address) {
                    // An unknown file id leaves the file name unset.
                    resolved.source_file_name = self.files.get(&line.file).map(String::as_str);
                    resolved.source_line = Some(line.line);
                    resolved.source_line_base = Some(module_base.wrapping_add(line_base));
                }
                return resolved
            }

            // The nearest function does not cover the address. A public
            // symbol applies only if it starts past that function, i.e.
            // the address lies in the gap between the two.
            if let Some((public, public_addr)) = self.public_symbols.retrieve(address) {
                if public_addr > func_base {
                    resolved.function_name = Some(public.name.as_str());
                    resolved.function_base = Some(module_base.wrapping_add(public_addr));
                }
            }
            return resolved
        }

        if let Some((public, public_addr)) = self.public_symbols.retrieve(address) {
            resolved.function_name = Some(public.name.as_str());
            resolved.function_base = Some(module_base.wrapping_add(public_addr));
        }
        resolved
    }

    /// Find Windows unwinding data covering `instruction`.
    ///
    /// Frame data records are preferred over FPO ones: they are the
    /// newer kind and carry their own program string. Without either, a
    /// covering function still yields a minimal carrier stating the
    /// parameter size.
    pub fn find_windows_frame_info(
        &self,
        module_base: Addr,
        instruction: Addr,
    ) -> Option<WindowsFrameInfo> {
        let address = instruction.wrapping_sub(module_base);

        for kind in [StackInfoKind::FrameData, StackInfoKind::Fpo] {
            let container = &self.windows_frame_info[kind as usize];
            if let Some((info, _base, _size)) = container.retrieve_range(address) {
                return Some(info.clone())
            }
        }

        let (func, func_base, func_size) = self.functions.retrieve_nearest(address)?;
        if address >= func_base && address - func_base < func_size {
            let info = WindowsFrameInfo {
                parameter_size: func.parameter_size,
                valid: WindowsFrameInfo::VALID_PARAMETER_SIZE,
                ..Default::default()
            };
            return Some(info)
        }
        None
    }

    /// Compose the CFI rule set in effect at `instruction`.
    ///
    /// The initial rule set covering the address is refined by every
    /// delta rule from the initial rule's base up to and including the
    /// address itself.
    pub fn find_cfi_frame_info(
        &self,
        module_base: Addr,
        instruction: Addr,
    ) -> Option<CfiFrameInfo> {
        let address = instruction.wrapping_sub(module_base);
        let (initial, initial_base, _initial_size) =
            self.cfi_initial_rules.retrieve_range(address)?;

        let mut rules = CfiFrameInfo::default();
        let () = rules.parse_rules(initial).ok()?;

        for (_addr, delta) in self
            .cfi_delta_rules
            .range(initial_base..)
            .take_while(|(delta_addr, _)| **delta_addr <= address)
        {
            // A malformed delta leaves the accumulated set untouched.
            let _result = rules.parse_rules(delta);
        }
        Some(rules)
    }
}
