//! Evaluation of parameter location expressions.
//!
//! Symbol files may annotate a function with per-parameter location
//! programs, small stack machines over a subset of the DWARF expression
//! operations. Evaluating such a program against the registers of a
//! stack frame and a view of the crashed process' memory yields the
//! address a parameter lives at; reading and formatting the bytes there
//! recovers its value.

use std::fmt::Write as _;

use gimli::constants::*;

use crate::log::debug;
use crate::resolver::ParamValue;
use crate::types::Function;
use crate::types::LocOp;
use crate::FrameView;
use crate::MemoryView;


/// Evaluate a location program and return the effective address of the
/// value it describes.
///
/// Zero signals failure: an unsupported operation, a stack underflow,
/// or an unreadable dereference. Callers treat such a parameter as
/// having no recoverable location.
pub(crate) fn evaluate_expression(
    frame: &dyn FrameView,
    memory: &dyn MemoryView,
    location: &[LocOp],
) -> u64 {
    let mut stack = Vec::new();
    let frame_base = frame.frame_base();
    if frame_base == 0 {
        debug!("frame base is unknown; fbreg operations will not resolve");
    }

    for loc in location {
        let op = DwOp(loc.op);
        let value = if (DW_OP_reg0.0..=DW_OP_reg31.0).contains(&loc.op) {
            frame.register(u64::from(loc.op - DW_OP_reg0.0))
        } else if (DW_OP_breg0.0..=DW_OP_breg31.0).contains(&loc.op) {
            // The offset is a signed 64 bit value; two's complement
            // wrap-around is the addition we want.
            frame
                .register(u64::from(loc.op - DW_OP_breg0.0))
                .wrapping_add(loc.value1)
        } else if (DW_OP_lit0.0..=DW_OP_lit31.0).contains(&loc.op) {
            u64::from(loc.op - DW_OP_lit0.0)
        } else if op == DW_OP_fbreg {
            frame_base.wrapping_add(loc.value1)
        } else if op == DW_OP_regx {
            frame.register(loc.value1)
        } else if op == DW_OP_addr
            || op == DW_OP_const1u
            || op == DW_OP_const2u
            || op == DW_OP_const4u
            || op == DW_OP_const8u
            || op == DW_OP_const8s
        {
            loc.value1
        } else if op == DW_OP_const1s {
            loc.value1 as u8 as i8 as i64 as u64
        } else if op == DW_OP_const2s {
            loc.value1 as u16 as i16 as i64 as u64
        } else if op == DW_OP_const4s {
            loc.value1 as u32 as i32 as i64 as u64
        } else if op == DW_OP_deref {
            let addr = match stack.pop() {
                Some(addr) => addr,
                None => return 0,
            };
            match memory.read_u64(addr) {
                Some(value) => value,
                None => return 0,
            }
        } else if op == DW_OP_dup {
            match stack.last() {
                Some(value) => *value,
                None => return 0,
            }
        } else if op == DW_OP_over {
            if stack.len() < 2 {
                return 0
            }
            stack[stack.len() - 2]
        } else if op == DW_OP_pick {
            if stack.is_empty() {
                return 0
            }
            let top = (stack.len() - 1) as u64;
            if top < loc.value1 {
                return 0
            }
            stack[(top - loc.value1) as usize]
        } else if op == DW_OP_drop {
            if stack.pop().is_none() {
                return 0
            }
            continue
        } else if op == DW_OP_swap {
            let len = stack.len();
            if len < 2 {
                return 0
            }
            let () = stack.swap(len - 1, len - 2);
            continue
        } else if op == DW_OP_rot {
            let len = stack.len();
            if len < 3 {
                return 0
            }
            let () = stack.swap(len - 1, len - 3);
            let () = stack.swap(len - 1, len - 2);
            continue
        } else {
            // deref_size, xderef, xderef_size, and everything else the
            // symbol dumper never emits.
            return 0
        };
        let () = stack.push(value);
    }

    stack.last().copied().unwrap_or(0)
}


/// Format the 64 bit word read at a parameter's address according to
/// the parameter's type, followed by a dump of the type's raw bytes.
fn format_value(
    memory: &dyn MemoryView,
    addr: u64,
    value: u64,
    type_name: &str,
    type_size: u32,
) -> String {
    let mut out = String::new();

    // Only even sizes up to a machine word render as a typed value;
    // anything else is covered by the byte dump alone.
    if type_size % 2 == 0 && type_size <= 8 {
        if type_name.contains('*') || type_name.contains('&') {
            let _ = write!(out, "{value:#x}");
        } else if type_name.contains("float") {
            let _ = write!(out, "{}", f32::from_bits(value as u32));
        } else if type_name.contains("double") {
            let _ = write!(out, "{}", f64::from_bits(value));
        } else {
            let mask = u64::MAX >> ((8 - type_size) * 8);
            let _ = write!(out, "{:#x}", value & mask);
        }
        let () = out.push_str(", ");
    }

    let () = out.push_str("hex:");
    for offset in 0..u64::from(type_size) {
        let byte = match memory.read_u8(addr.wrapping_add(offset)) {
            Some(byte) => byte,
            None => break,
        };
        if offset > 0 {
            let () = out.push(' ');
        }
        let _ = write!(out, "{byte:x}");
    }
    out
}

/// Recover the values of a function's parameters at the queried frame.
///
/// Parameters whose location cannot be computed are omitted; an
/// unreadable value read ends recovery for the remaining parameters as
/// well.
pub(crate) fn recover_parameters<'func>(
    frame: &dyn FrameView,
    memory: &dyn MemoryView,
    func: &'func Function,
) -> Vec<ParamValue<'func>> {
    let mut values = Vec::with_capacity(func.params.len());

    for param in &func.params {
        if param.type_size == 0 {
            let () = values.push(ParamValue {
                type_name: &param.type_name,
                type_size: param.type_size,
                name: &param.name,
                value: String::new(),
            });
            continue
        }

        let addr = evaluate_expression(frame, memory, &param.location);
        if addr == 0 {
            debug!(
                "no location for parameter {} ({}) of function {}",
                param.name, param.type_name, func.name
            );
            continue
        }

        let value = match memory.read_u64(addr) {
            Some(value) => value,
            None => break,
        };

        let () = values.push(ParamValue {
            type_name: &param.type_name,
            type_size: param.type_size,
            name: &param.name,
            value: format_value(memory, addr, value, &param.type_name, param.type_size),
        });
    }
    values
}
