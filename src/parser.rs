//! Parser for Breakpad style symbol files.
//!
//! See <https://github.com/google/breakpad/blob/main/docs/symbol_files.md>
//! for the format; the parameter metadata extension to `FUNC` records
//! is described on [`Parameter`].
//!
//! Record grammars are expressed as nom combinators. The loader feeds
//! them one line at a time and is deliberately tolerant: a malformed
//! record is counted and skipped rather than failing the load, because
//! partial symbol data still makes for a better crash report than
//! none.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::mem;
use std::ops::BitOr;
use std::ops::Shl;
use std::str;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::bytes::complete::take_while;
use nom::character::complete::space1;
use nom::character::is_digit;
use nom::character::is_hex_digit;
use nom::combinator::cut;
use nom::combinator::eof;
use nom::combinator::map;
use nom::combinator::map_res;
use nom::combinator::opt;
use nom::combinator::rest;
use nom::combinator::verify;
use nom::error::ErrorKind;
use nom::error::ParseError;
use nom::error::VerboseError;
use nom::sequence::terminated;
use nom::sequence::tuple;
use nom::Err;
use nom::IResult;

use crate::log::warn;
use crate::range_map::AddressMap;
use crate::range_map::RangeMap;
use crate::types::Function;
use crate::types::LocOp;
use crate::types::Parameter;
use crate::types::PublicSymbol;
use crate::types::SourceLine;
use crate::types::StackInfoKind;
use crate::types::SymbolFile;
use crate::types::WindowsFrameInfo;
use crate::util::from_radix_16;
use crate::util::tokenize;
use crate::util::trim_ascii;
use crate::util::trim_ascii_end;
use crate::Addr;
use crate::Result;


/// How many parse errors are logged before suppressing further ones.
const MAX_ERRORS_PRINTED: u32 = 5;
/// How many parse errors are tolerated before the load gives up.
const MAX_ERRORS_BEFORE_BAILING: u32 = 100;


type Parsed<'buf, T> = IResult<&'buf [u8], T, VerboseError<&'buf [u8]>>;


/// Match a hex string, parse it to a u32 or a u64.
fn hex_str<T: Shl<T, Output = T> + BitOr<T, Output = T> + From<u8>>(
    input: &[u8],
) -> Parsed<'_, T> {
    // Consume up to max_len digits. For u32 that's 8 digits and for u64 that's
    // 16 digits. Two hex digits form one byte.
    let max_len = mem::size_of::<T>() * 2;

    let mut res: T = T::from(0);
    let mut k = 0;
    for v in input.iter().take(max_len) {
        let digit = match (*v as char).to_digit(16) {
            Some(v) => v,
            None => break,
        };
        res = res << T::from(4);
        res = res | T::from(digit as u8);
        k += 1;
    }
    if k == 0 {
        return Err(Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::HexDigit,
        )))
    }
    let remaining = &input[k..];
    Ok((remaining, res))
}

/// Match a decimal string, parse it to a u32.
fn decimal_u32(input: &[u8]) -> Parsed<'_, u32> {
    const MAX_LEN: usize = 10; // u32::MAX has 10 decimal digits
    let mut res: u64 = 0;
    let mut k = 0;
    for v in input.iter().take(MAX_LEN) {
        let digit_value = match (*v as char).to_digit(10) {
            Some(v) => v,
            None => break,
        };
        res = res * 10 + u64::from(digit_value);
        k += 1;
    }
    if k == 0 {
        return Err(Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Digit,
        )))
    }
    let res = u32::try_from(res)
        .map_err(|_| Err::Error(VerboseError::from_error_kind(input, ErrorKind::TooLarge)))?;
    let remaining = &input[k..];
    Ok((remaining, res))
}

/// Parse a single byte if it matches the predicate.
fn single(predicate: fn(u8) -> bool) -> impl Fn(&[u8]) -> IResult<&[u8], u8, VerboseError<&[u8]>> {
    move |i: &[u8]| match i.split_first() {
        Some((b, rest)) if predicate(*b) => Ok((rest, *b)),
        _ => Err(Err::Error(VerboseError::from_error_kind(
            i,
            ErrorKind::Satisfy,
        ))),
    }
}

/// Take the remainder of the line as a non-empty UTF-8 string.
fn tail_str(input: &[u8]) -> Parsed<'_, &str> {
    verify(map_res(rest, str::from_utf8), |tail: &&str| {
        !tail.is_empty()
    })(input)
}

/// Matches a FILE record.
fn file_line(input: &[u8]) -> Parsed<'_, (u32, String)> {
    let (input, _) = terminated(tag("FILE"), space1)(input)?;
    let (input, (id, filename)) = cut(tuple((
        terminated(decimal_u32, space1),
        map(tail_str, String::from),
    )))(input)?;
    Ok((input, (id, filename)))
}

/// Matches a PUBLIC record.
fn public_line(input: &[u8]) -> Parsed<'_, PublicSymbol> {
    let (input, _) = terminated(tag("PUBLIC"), space1)(input)?;
    let (input, (_multiple, addr, parameter_size, name)) = cut(tuple((
        opt(terminated(tag("m"), space1)),
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u32>, space1),
        map(tail_str, String::from),
    )))(input)?;
    Ok((
        input,
        PublicSymbol {
            addr,
            name,
            parameter_size,
        },
    ))
}

/// Matches line data after a FUNC record.
///
/// Anything following the file id after a separator is ignored.
fn source_line(input: &[u8]) -> Parsed<'_, SourceLine> {
    let (input, (addr, size, line, file)) = tuple((
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u64>, space1),
        terminated(decimal_u32, space1),
        terminated(decimal_u32, alt((space1, eof))),
    ))(input)?;
    Ok((
        input,
        SourceLine {
            addr,
            size,
            file,
            line,
        },
    ))
}

/// Matches a FUNC record, including the optional parameter metadata.
fn func_line(input: &[u8]) -> Parsed<'_, Function> {
    let (input, _) = terminated(tag("FUNC"), space1)(input)?;
    let (input, (_multiple, addr, size, parameter_size)) = cut(tuple((
        opt(terminated(tag("m"), space1)),
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u32>, space1),
    )))(input)?;
    // The name reaches up to the `#` introducing parameter metadata, or
    // to the end of the line.
    let (input, name) = cut(verify(
        map_res(take_while(|b| b != b'#'), |name: &[u8]| {
            str::from_utf8(trim_ascii_end(name))
        }),
        |name: &&str| !name.is_empty(),
    ))(input)?;

    let params = match input.split_first() {
        Some((b'#', metadata)) => parse_func_params(metadata),
        _ => Vec::new(),
    };

    let func = Function {
        addr,
        size,
        parameter_size,
        name: name.to_string(),
        params,
        lines: RangeMap::default(),
    };
    Ok((&input[input.len()..], func))
}

/// Parse the `<nparams> # <param>#<param>#…` metadata trailing a
/// function's name.
///
/// The metadata is best effort: a malformed parameter count yields a
/// function without parameters, and a single malformed parameter drops
/// the whole list. Neither fails the FUNC record itself.
fn parse_func_params(metadata: &[u8]) -> Vec<Parameter> {
    let (count, list) = match metadata.iter().position(|b| *b == b'#') {
        Some(idx) => (&metadata[..idx], &metadata[idx + 1..]),
        None => return Vec::new(),
    };
    let count = match from_radix_16(trim_ascii(count)) {
        Some(count) => count as usize,
        None => return Vec::new(),
    };

    let pieces = tokenize(list, b"#", count);
    if pieces.len() != count {
        return Vec::new()
    }

    let mut params = Vec::with_capacity(count);
    for piece in pieces {
        match parse_one_param(piece) {
            Some(param) => {
                let () = params.push(param);
            }
            None => return Vec::new(),
        }
    }
    params
}

/// Parse a single `<typeName>@<typeSizeHex>@<paramName>@<locExpr>`
/// parameter description.
fn parse_one_param(piece: &[u8]) -> Option<Parameter> {
    let fields = tokenize(trim_ascii(piece), b"@", 4);
    let [type_name, type_size, name, loc_expr] = <[&[u8]; 4]>::try_from(fields).ok()?;

    let type_name = str::from_utf8(type_name).ok()?;
    let name = str::from_utf8(name).ok()?;
    // A garbled size degrades to zero; the parameter is then reported
    // without a value.
    let type_size = from_radix_16(type_size)
        .and_then(|size| u32::try_from(size).ok())
        .unwrap_or(0);

    let ops = tokenize(loc_expr, b"$", usize::MAX);
    if ops.is_empty() {
        return None
    }

    let mut location = Vec::with_capacity(ops.len());
    for op_str in ops {
        let fields = tokenize(op_str, b":", 4);
        // A garbled operation code invalidates the whole list, while
        // garbled auxiliary values merely degrade to zero.
        let op = from_radix_16(fields.first()?)? as u8;
        let value1 = fields.get(1).and_then(|v| from_radix_16(v)).unwrap_or(0);
        let value2 = fields.get(2).and_then(|v| from_radix_16(v)).unwrap_or(0);
        let () = location.push(LocOp { op, value1, value2 });
    }

    Some(Parameter {
        type_name: type_name.to_string(),
        type_size,
        name: name.to_string(),
        location,
    })
}

/// Matches a STACK WIN record.
///
/// Yields `None` for the record kinds that parse fine but are not
/// tracked (trap, TLS, and standard frame info).
fn stack_win_line(
    input: &[u8],
) -> Parsed<'_, Option<(StackInfoKind, Addr, u64, WindowsFrameInfo)>> {
    let (input, _) = terminated(tag("STACK WIN"), space1)(input)?;
    let (
        input,
        (
            ty,
            rva,
            code_size,
            prologue_size,
            epilogue_size,
            parameter_size,
            saved_register_size,
            local_size,
            max_stack_size,
            has_program_string,
        ),
    ) = cut(tuple((
        terminated(single(is_hex_digit), space1),
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(hex_str::<u32>, space1),
        terminated(map(single(is_digit), |b| b == b'1'), space1),
    )))(input)?;
    let (input, tail) = cut(tail_str)(input)?;

    let kind = match ty {
        b'0' => Some(StackInfoKind::Fpo),
        b'4' => Some(StackInfoKind::FrameData),
        b'1' | b'2' | b'3' => None,
        _ => {
            return Err(Err::Failure(VerboseError::from_error_kind(
                input,
                ErrorKind::Satisfy,
            )))
        }
    };
    let kind = match kind {
        Some(kind) => kind,
        None => return Ok((input, None)),
    };

    let mut info = WindowsFrameInfo {
        kind: Some(kind),
        valid: WindowsFrameInfo::VALID_ALL,
        prologue_size,
        epilogue_size,
        parameter_size,
        saved_register_size,
        local_size,
        max_stack_size,
        allocates_base_pointer: false,
        program_string: None,
    };
    if has_program_string {
        info.program_string = Some(tail.to_string());
    } else {
        info.allocates_base_pointer =
            from_radix_16(trim_ascii(tail.as_bytes())).unwrap_or(0) != 0;
    }
    Ok((input, Some((kind, rva, code_size, info))))
}

/// Matches a STACK CFI INIT record.
fn stack_cfi_init_line(input: &[u8]) -> Parsed<'_, (Addr, u64, String)> {
    let (input, _) = terminated(tag("STACK CFI INIT"), space1)(input)?;
    let (input, (addr, size, rules)) = cut(tuple((
        terminated(hex_str::<u64>, space1),
        terminated(hex_str::<u64>, space1),
        map(tail_str, String::from),
    )))(input)?;
    Ok((input, (addr, size, rules)))
}

/// Matches a STACK CFI delta record.
fn stack_cfi_delta_line(input: &[u8]) -> Parsed<'_, (Addr, String)> {
    let (input, _) = terminated(tag("STACK CFI"), space1)(input)?;
    let (input, (addr, rules)) = cut(tuple((
        terminated(hex_str::<u64>, space1),
        map(tail_str, String::from),
    )))(input)?;
    Ok((input, (addr, rules)))
}


/// A parser for Breakpad symbol files.
///
/// Feeds one record line at a time into the module index under
/// construction while counting errors, then bundles everything up into
/// the final [`SymbolFile`].
#[derive(Debug, Default)]
struct SymbolParser {
    files: HashMap<u32, String>,
    functions: RangeMap<Function>,
    public_symbols: AddressMap<PublicSymbol>,
    windows_frame_info: [RangeMap<WindowsFrameInfo>; 2],
    cfi_initial_rules: RangeMap<String>,
    cfi_delta_rules: BTreeMap<Addr, String>,
    /// The function whose line records we are currently collecting.
    cur_func: Option<Function>,
    line_number: u64,
    num_errors: u32,
}

impl SymbolParser {
    fn report_error(&mut self, message: &str) {
        self.num_errors += 1;
        if self.num_errors <= MAX_ERRORS_PRINTED {
            if self.line_number > 0 {
                warn!("line {}: {message}", self.line_number);
            } else {
                warn!("{message}");
            }
        }
    }

    /// Move the current function, whose line records are complete, into
    /// the index.
    fn finish_function(&mut self) {
        if let Some(func) = self.cur_func.take() {
            // A function with an invalid extent or one crossing an
            // already stored range is dropped, along with the line
            // records it collected.
            let _stored = self.functions.store_range(func.addr, func.size, func);
        }
    }

    fn parse_line(&mut self, line: &[u8]) {
        if line.starts_with(b"FUNC ") {
            let () = self.finish_function();
            match func_line(line) {
                Ok((_rest, func)) => self.cur_func = Some(func),
                Err(_err) => self.report_error("failed to parse FUNC record"),
            }
        } else if line.starts_with(b"PUBLIC ") {
            // Public symbols carry no line records; any current
            // function ends here.
            let () = self.finish_function();
            match public_line(line) {
                Ok((_rest, symbol)) => {
                    // Symbols with an address of zero show up in the
                    // wild (ntdll.pdb). Accept them as input but keep
                    // them out of the index, where they could only
                    // conflict.
                    if symbol.addr != 0 && !self.public_symbols.store(symbol.addr, symbol) {
                        let () = self.report_error("duplicate PUBLIC symbol address");
                    }
                }
                Err(_err) => self.report_error("failed to parse PUBLIC record"),
            }
        } else if line.starts_with(b"FILE ") {
            match file_line(line) {
                Ok((_rest, (id, filename))) => {
                    let _prev = self.files.insert(id, filename);
                }
                Err(_err) => self.report_error("failed to parse FILE record"),
            }
        } else if line.starts_with(b"STACK ") {
            let () = self.parse_stack_info(line);
        } else if line.starts_with(b"MODULE ") || line.starts_with(b"INFO ") {
            // Housekeeping records for symbol suppliers; nothing to
            // index.
        } else {
            // A bare line record extending the current function.
            let func = match self.cur_func.as_mut() {
                Some(func) => func,
                None => {
                    let () = self.report_error("found source line data without a function");
                    return
                }
            };
            match source_line(line) {
                Ok((_rest, line)) => {
                    // Line records outside their function's extent are
                    // dropped, as is anything the nested container
                    // rejects.
                    let within = line.addr >= func.addr && {
                        let offset = line.addr - func.addr;
                        line.size <= func.size && offset <= func.size - line.size
                    };
                    if within {
                        let _stored = func.lines.store_range(line.addr, line.size, line);
                    }
                }
                Err(_err) => self.report_error("failed to parse source line record"),
            }
        }
    }

    fn parse_stack_info(&mut self, line: &[u8]) {
        if line.starts_with(b"STACK WIN ") {
            match stack_win_line(line) {
                Ok((_rest, Some((kind, rva, code_size, info)))) => {
                    // MSVC infrequently emits STACK WIN ranges that
                    // violate containment once prologues overlap; those
                    // are dropped silently.
                    let _stored =
                        self.windows_frame_info[kind as usize].store_range(rva, code_size, info);
                }
                Ok((_rest, None)) => {}
                Err(_err) => self.report_error("failed to parse STACK WIN record"),
            }
        } else if line.starts_with(b"STACK CFI INIT ") {
            match stack_cfi_init_line(line) {
                Ok((_rest, (addr, size, rules))) => {
                    let _stored = self.cfi_initial_rules.store_range(addr, size, rules);
                }
                Err(_err) => self.report_error("failed to parse STACK CFI INIT record"),
            }
        } else if line.starts_with(b"STACK CFI ") {
            match stack_cfi_delta_line(line) {
                Ok((_rest, (addr, rules))) => {
                    let _prev = self.cfi_delta_rules.insert(addr, rules);
                }
                Err(_err) => self.report_error("failed to parse STACK CFI record"),
            }
        } else {
            let () = self.report_error("unrecognized STACK record");
        }
    }

    /// Finish the parse and create the final [`SymbolFile`].
    fn finish(mut self) -> SymbolFile {
        let () = self.finish_function();

        SymbolFile {
            files: self.files,
            functions: self.functions,
            public_symbols: self.public_symbols,
            windows_frame_info: self.windows_frame_info,
            cfi_initial_rules: self.cfi_initial_rules,
            cfi_delta_rules: self.cfi_delta_rules,
            is_corrupt: self.num_errors > 0,
        }
    }
}


impl SymbolFile {
    /// Parse a [`SymbolFile`] from the raw bytes of a symbol file.
    ///
    /// Loading is a single pass over the buffer and tolerates malformed
    /// records: they are counted (the first few get logged) and
    /// skipped, with the module flagged via
    /// [`is_corrupt`](Self::is_corrupt). Only a pathological amount of
    /// errors stops the pass early. An empty buffer yields a valid,
    /// empty module.
    pub fn from_bytes(bytes: &[u8]) -> Result<SymbolFile> {
        let mut parser = SymbolParser::default();

        // The final byte acts as the buffer's terminator, whatever it
        // is, and trailing null bytes do not take part in parsing.
        let data = match bytes.split_last() {
            Some((_last, data)) => data,
            None => &[],
        };
        let end = data
            .iter()
            .rposition(|b| *b != b'\0')
            .map_or(0, |idx| idx + 1);
        let data = &data[..end];

        if data.contains(&b'\0') {
            // Null bytes in the middle of the data terminate records
            // like line breaks do, so that the records around them
            // survive. However many there are, they count as a single
            // error.
            let () = parser.report_error("unexpected null byte in the middle of the symbol data");
        }

        for line in data.split(|b| matches!(b, b'\n' | b'\r' | b'\0')) {
            if line.is_empty() {
                continue
            }
            parser.line_number += 1;
            let () = parser.parse_line(line);

            if parser.num_errors >= MAX_ERRORS_BEFORE_BAILING {
                warn!("giving up on symbol data: too many parse errors");
                break
            }
        }
        Ok(parser.finish())
    }
}
