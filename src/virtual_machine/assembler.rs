//! Assembly language parser and bytecode compiler.
//!
//! Converts human-readable assembly source into executable bytecode. Operand
//! layouts come from [`Instruction::operands`], which is generated from the
//! instruction table.
//!
//! # Syntax
//!
//! ```text
//! label:                       # labels end with ':'
//! pub entry: INSTR op1, op2    # 'pub' labels are exported as entry points
//! LOAD r1, "text"              # literal: number, "string", true/false, 0xhex, Type:value
//! CAST r1, r2, Number          # type operands are VMType names
//! JMPIF r1, label              # offsets are numbers or label names
//! ```
//!
//! - Mnemonics are case-insensitive
//! - Registers use `r` prefix (e.g., `r0`, `r255`)
//! - Comments start with `#`
//! - Commas between operands are optional

use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::utils::hex;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::object::{VMObject, VMType};
use crate::virtual_machine::operand::{
    OperandKind, emit_data, emit_reg, emit_type, emit_var, emit_var_wide,
};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const PUBLIC_PREFIX: &str = "pub";

/// Output of a successful assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledScript {
    pub script: Vec<u8>,
    /// `pub` labels with their script offsets, in source order.
    pub entry_points: Vec<(String, usize)>,
}

/// Formats a compiler-style diagnostic for assembly failures.
pub fn render_assembly_diagnostic(file: &str, source: &str, err: &VMError) -> String {
    let mut diag = String::new();
    let VMError::Assembly {
        line,
        offset,
        message,
    } = err
    else {
        let _ = writeln!(diag, "error: {err}");
        return diag;
    };

    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
/// - `"` delimits strings, `\` escapes the next character inside them
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(8);

    let mut start: Option<usize> = None;
    let mut start_col: usize = 0;
    let mut in_str = false;

    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == COMMENT_CHAR as u8 && !in_str {
            break;
        }

        match b {
            b'\\' if in_str => {
                i += 2;
            }

            b'"' => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                in_str = !in_str;
                i += 1;
            }

            b',' | b' ' | b'\t' if !in_str => {
                if let Some(s) = start {
                    let text = line[s..i].trim();
                    if !text.is_empty() {
                        out.push(Token {
                            text,
                            offset: start_col,
                        });
                    }
                    start = None;
                }
                i += 1;
            }

            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                i += 1;
            }
        }
    }

    if in_str {
        return Err(VMError::Assembly {
            line: line_no,
            offset: start_col,
            message: "unterminated string literal (missing closing quote)".into(),
        });
    }

    if let Some(s) = start {
        let text = line[s..bytes.len()].trim();
        if !text.is_empty() {
            out.push(Token {
                text,
                offset: start_col,
            });
        }
    }

    Ok(out)
}

/// Parse a register token like `r0`, `r15`.
pub(crate) fn parse_reg(tok: &str) -> Result<u8, String> {
    tok.strip_prefix('r')
        .ok_or_else(|| format!("expected register, found '{tok}'"))?
        .parse::<u8>()
        .map_err(|_| format!("invalid register '{tok}'"))
}

fn parse_type(tok: &str) -> Result<VMType, String> {
    VMType::from_name(tok).ok_or_else(|| format!("unknown type '{tok}'"))
}

/// Removes surrounding quotes and resolves `\"`, `\\`, `\n` and `\t`.
fn unquote(tok: &str) -> Option<String> {
    let inner = tok.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// Parses a `LOAD` literal into the object it denotes.
///
/// Bare forms: decimal numbers, `"strings"`, `true`/`false`, `0x` bytes and
/// `None`. `Type:value` converts a bare form to `Type`; `Address:` and
/// `Hash:` accept the `0x` form.
pub fn parse_literal(tok: &str) -> Result<VMObject, String> {
    if let Some(s) = unquote(tok) {
        return Ok(VMObject::String(s));
    }
    if let Some((ty, value)) = tok.split_once(':') {
        let ty = parse_type(ty)?;
        let raw = parse_literal(value)?;
        let converted = match ty {
            VMType::Object => {
                let bytes = raw.as_bytes().map_err(|e| e.to_string())?;
                if let Some(hash) = Hash::from_slice(&bytes) {
                    VMObject::from_hash(hash)
                } else {
                    raw.as_address().map(VMObject::from_address).map_err(|e| e.to_string())?
                }
            }
            _ => raw.cast_to(ty).map_err(|e| e.to_string())?,
        };
        return Ok(converted);
    }
    match tok {
        "true" => return Ok(VMObject::Bool(true)),
        "false" => return Ok(VMObject::Bool(false)),
        "None" | "null" => return Ok(VMObject::None),
        _ => {}
    }
    if let Some(digits) = tok.strip_prefix("0x") {
        return hex::decode(digits)
            .map(VMObject::Bytes)
            .ok_or_else(|| format!("invalid hex literal '{tok}'"));
    }
    BigInt::from_str(tok)
        .map(VMObject::Number)
        .map_err(|_| format!("invalid literal '{tok}'"))
}

fn parse_literal_object(tok: &str) -> Result<VMObject, String> {
    if let Some(rest) = tok.strip_prefix("Address:") {
        let address = Address::from_text(rest).ok_or_else(|| format!("invalid address '{rest}'"))?;
        return Ok(VMObject::from_address(address));
    }
    if let Some(rest) = tok.strip_prefix("Hash:") {
        let hash = rest
            .strip_prefix("0x")
            .and_then(hex::decode)
            .and_then(|bytes| Hash::from_slice(&bytes))
            .ok_or_else(|| format!("invalid hash '{rest}'"))?;
        return Ok(VMObject::from_hash(hash));
    }
    parse_literal(tok)
}

/// Checks if a token is a label definition (ends with `:`).
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1 && !tok.starts_with('"')
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Encodes one instruction. Label references are always emitted wide, so the
/// encoded size is the same whether or not labels are resolved yet.
fn encode_instruction(
    instr: Instruction,
    operands: &[Token],
    labels: Option<&HashMap<String, usize>>,
    out: &mut Vec<u8>,
) -> Result<(), (usize, String)> {
    let kinds = instr.operands();
    let expected = kinds.len()
        - kinds
            .windows(2)
            .filter(|w| w[0] == OperandKind::Type && w[1] == OperandKind::Data)
            .count();
    if operands.len() != expected {
        return Err((
            operands.first().map(|t| t.offset).unwrap_or(1),
            format!(
                "{} expects {} operand(s), found {}",
                instr.mnemonic(),
                expected,
                operands.len()
            ),
        ));
    }

    out.push(instr as u8);
    let mut tokens = operands.iter();
    let mut i = 0;
    while i < kinds.len() {
        let Some(tok) = tokens.next() else {
            break;
        };
        let at = |message: String| (tok.offset, message);
        match kinds[i] {
            OperandKind::Reg => emit_reg(out, parse_reg(tok.text).map_err(at)?),
            OperandKind::Var => match tok.text.parse::<u64>() {
                Ok(value) => emit_var(out, value),
                Err(_) => {
                    let target = match labels {
                        Some(labels) => *labels
                            .get(tok.text)
                            .ok_or_else(|| at(VMError::UndefinedLabel(tok.text.into()).to_string()))?,
                        None => 0,
                    };
                    let target = u32::try_from(target)
                        .map_err(|_| at(format!("label '{}' out of range", tok.text)))?;
                    emit_var_wide(out, target);
                }
            },
            OperandKind::Type if kinds.get(i + 1) == Some(&OperandKind::Data) => {
                let value = parse_literal_object(tok.text).map_err(at)?;
                let data = value.to_raw().map_err(|e| at(e.to_string()))?;
                emit_type(out, value.vm_type());
                emit_data(out, &data);
                i += 1;
            }
            OperandKind::Type => emit_type(out, parse_type(tok.text).map_err(at)?),
            OperandKind::Data => {
                let value = parse_literal_object(tok.text).map_err(at)?;
                emit_data(out, &value.as_bytes().map_err(|e| at(e.to_string()))?);
            }
        }
        i += 1;
    }
    Ok(())
}

struct SourceLine<'a> {
    line_no: usize,
    instr: Instruction,
    operands: Vec<Token<'a>>,
}

/// Assemble a full source string into bytecode.
///
/// Uses two-pass assembly:
/// 1. First pass: tokenize lines, record label positions and instruction sizes
/// 2. Second pass: encode instructions with label resolution
pub fn assemble_source(source: &str) -> Result<AssembledScript, VMError> {
    let mut lines = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut entry_points = Vec::new();
    let mut size = 0usize;
    let mut scratch = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(line_no, raw)?;
        let mut rest = tokens.as_slice();

        let is_pub = rest.len() > 1 && rest[0].text == PUBLIC_PREFIX && is_label_def(rest[1].text);
        if is_pub {
            rest = &rest[1..];
        }
        if let Some(first) = rest.first()
            && is_label_def(first.text)
        {
            let name = label_name(first.text).to_string();
            if labels.insert(name.clone(), size).is_some() {
                return Err(VMError::Assembly {
                    line: line_no,
                    offset: first.offset,
                    message: VMError::DuplicateLabel(name).to_string(),
                });
            }
            if is_pub {
                entry_points.push((name, size));
            }
            rest = &rest[1..];
        }

        let Some((head, operands)) = rest.split_first() else {
            continue;
        };
        let instr = Instruction::from_mnemonic(head.text).ok_or_else(|| VMError::Assembly {
            line: line_no,
            offset: head.offset,
            message: format!("unknown instruction '{}'", head.text),
        })?;

        scratch.clear();
        encode_instruction(instr, operands, None, &mut scratch).map_err(|(offset, message)| {
            VMError::Assembly {
                line: line_no,
                offset,
                message,
            }
        })?;
        size += scratch.len();

        lines.push(SourceLine {
            line_no,
            instr,
            operands: operands.to_vec(),
        });
    }

    let mut script = Vec::with_capacity(size);
    for line in &lines {
        encode_instruction(line.instr, &line.operands, Some(&labels), &mut script).map_err(
            |(offset, message)| VMError::Assembly {
                line: line.line_no,
                offset,
                message,
            },
        )?;
    }

    Ok(AssembledScript {
        script,
        entry_points,
    })
}

/// Convenience: assemble directly from file path.
///
/// Logs a compiler-style diagnostic on failure.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<AssembledScript, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref)
        .map_err(|e| VMError::Io(format!("{}: {e}", path_ref.display())))?;
    let result = assemble_source(&source);
    if let Err(err) = &result {
        crate::error!(
            "{}",
            render_assembly_diagnostic(&path_ref.display().to_string(), &source, err)
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm(source: &str) -> Vec<u8> {
        assemble_source(source).unwrap().script
    }

    fn asm_err(source: &str) -> (usize, usize, String) {
        match assemble_source(source).unwrap_err() {
            VMError::Assembly {
                line,
                offset,
                message,
            } => (line, offset, message),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_reg_valid() {
        assert_eq!(parse_reg("r0").unwrap(), 0);
        assert_eq!(parse_reg("r255").unwrap(), 255);
    }

    #[test]
    fn parse_reg_invalid() {
        assert!(parse_reg("0").is_err());
        assert!(parse_reg("r256").is_err());
        assert!(parse_reg("r-1").is_err());
    }

    #[test]
    fn assemble_empty_and_comments() {
        assert!(asm("").is_empty());
        assert!(asm("# only a comment\n\n   # another").is_empty());
    }

    #[test]
    fn assemble_three_reg() {
        assert_eq!(
            asm("ADD r1, r2, r3"),
            vec![Instruction::Add as u8, 1, 2, 3]
        );
        assert_eq!(asm("add r1 r2 r3  # no commas"), asm("ADD r1, r2, r3"));
    }

    #[test]
    fn assemble_load_literals() {
        assert_eq!(
            asm("LOAD r0, 5"),
            vec![Instruction::Load as u8, 0, VMType::Number as u8, 1, 5]
        );
        assert_eq!(
            asm("LOAD r0, \"hi\""),
            vec![Instruction::Load as u8, 0, VMType::String as u8, 2, b'h', b'i']
        );
        assert_eq!(
            asm("LOAD r0, true"),
            vec![Instruction::Load as u8, 0, VMType::Bool as u8, 1, 1]
        );
        assert_eq!(
            asm("LOAD r0, Timestamp:7"),
            vec![Instruction::Load as u8, 0, VMType::Timestamp as u8, 4, 7, 0, 0, 0]
        );
    }

    #[test]
    fn string_with_spaces_and_escapes() {
        let script = asm(r#"LOAD r0, "a \"b\" c""#);
        assert_eq!(&script[4..], br#"a "b" c"#);
    }

    #[test]
    fn labels_resolve_to_absolute_offsets() {
        let script = asm("JMP end\nNOP\nend: RET");
        // JMP + wide var-int = 6 bytes, NOP = 1 byte
        assert_eq!(script[..6], [Instruction::Jmp as u8, 0xFE, 7, 0, 0, 0]);
        assert_eq!(script[6], Instruction::Nop as u8);
        assert_eq!(script[7], Instruction::Ret as u8);
    }

    #[test]
    fn public_labels_are_entry_points() {
        let out = assemble_source("pub first: RET\nhelper:\nNOP\npub second:\nRET").unwrap();
        assert_eq!(
            out.entry_points,
            vec![("first".to_string(), 0), ("second".to_string(), 2)]
        );
    }

    #[test]
    fn errors_carry_locations() {
        let (line, offset, message) = asm_err("NOP\n  BOGUS r1");
        assert_eq!((line, offset), (2, 3));
        assert!(message.contains("BOGUS"));

        let (line, _, message) = asm_err("ADD r1, r2");
        assert_eq!(line, 1);
        assert!(message.contains("expects 3"));

        let (_, _, message) = asm_err("JMP nowhere");
        assert_eq!(message, "undefined label: nowhere");

        let (line, _, message) = asm_err("a:\na:");
        assert_eq!(line, 2);
        assert_eq!(message, "duplicate label: a");

        let (_, offset, _) = asm_err("LOAD r1, \"open");
        assert_eq!(offset, 10);
    }

    #[test]
    fn diagnostic_points_at_column() {
        let source = "NOP\nPUSH x1";
        let err = assemble_source(source).unwrap_err();
        let diag = render_assembly_diagnostic("test.asm", source, &err);
        assert!(diag.contains(" --> test.asm:2:6"));
        assert!(diag.contains("   2 | PUSH x1"));
    }

    #[test]
    fn literal_forms() {
        assert_eq!(parse_literal("-12").unwrap(), VMObject::from_number(-12));
        assert_eq!(parse_literal("0x00ff").unwrap(), VMObject::Bytes(vec![0, 255]));
        assert_eq!(parse_literal("Enum:3").unwrap(), VMObject::Enum(3));
        assert_eq!(parse_literal("None").unwrap(), VMObject::None);
        let addr = Address::from_public_key(b"x");
        assert_eq!(
            parse_literal_object(&format!("Address:{addr}")).unwrap(),
            VMObject::from_address(addr)
        );
        assert!(parse_literal("nope").is_err());
    }
}
