use crate::sandbox::engine::MEMORY_SIZE;
use crate::sandbox::op::Op;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Program is empty")]
    EmptyProgram,
    #[error("Program has {len} instructions, limit is {max}")]
    ProgramTooLong { len: usize, max: usize },
    #[error("Unknown token '{token}' at position {position}")]
    UnknownToken { position: usize, token: String },
    #[error("Identifier '{name}' at position {position} is not an allowed host variable")]
    DisallowedIdentifier { position: usize, name: String },
    #[error("'{keyword}' at position {position} requires an argument")]
    MissingArgument { position: usize, keyword: String },
    #[error("Invalid argument '{token}' at position {position}")]
    InvalidArgument { position: usize, token: String },
    #[error("Jump target {target} is outside a program of {len} instructions")]
    JumpOutOfRange { target: usize, len: usize },
    #[error("Memory slot {slot} is outside 0..{size}")]
    SlotOutOfRange { slot: usize, size: usize },
}

/// Compiles whitespace-separated RPN source into instructions.
///
/// Identifiers resolve against `allowed_variables` only; anything else is
/// rejected before a single instruction runs. Jump targets are instruction
/// indices and may point one past the end (halt).
pub fn parse_program(
    source: &str,
    allowed_variables: &[&str],
    max_len: usize,
) -> Result<Vec<Op>, ParseError> {
    lazy_static::lazy_static! {
        static ref NUMBER_REGEX: Regex = Regex::new(r"^-?\d+(\.\d+)?([eE][-+]?\d+)?$").unwrap();
        static ref IDENT_REGEX: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
    }

    let tokens: Vec<&str> = source.split_whitespace().collect();
    let mut program = Vec::with_capacity(tokens.len());
    let mut position = 0;

    while position < tokens.len() {
        let token = tokens[position];
        let op = match token {
            "+" => Op::Add,
            "-" => Op::Subtract,
            "*" => Op::Multiply,
            "/" => Op::Divide,
            ">" => Op::GreaterThan,
            "<" => Op::LessThan,
            ">=" => Op::GreaterThanOrEqual,
            "<=" => Op::LessThanOrEqual,
            "==" => Op::Equal,
            "and" => Op::And,
            "or" => Op::Or,
            "not" => Op::Not,
            "abs" => Op::Abs,
            "neg" => Op::Negate,
            "min" => Op::Min,
            "max" => Op::Max,
            "ret" => Op::Return,
            "store" | "load" | "jmp" | "jz" => {
                let arg_token = tokens.get(position + 1).ok_or_else(|| ParseError::MissingArgument {
                    position,
                    keyword: token.to_string(),
                })?;
                let arg: usize = arg_token.parse().map_err(|_| ParseError::InvalidArgument {
                    position: position + 1,
                    token: arg_token.to_string(),
                })?;
                position += 1;
                match token {
                    "store" | "load" => {
                        let slot = u8::try_from(arg)
                            .ok()
                            .filter(|s| (*s as usize) < MEMORY_SIZE)
                            .ok_or(ParseError::SlotOutOfRange {
                                slot: arg,
                                size: MEMORY_SIZE,
                            })?;
                        if token == "store" {
                            Op::Store(slot)
                        } else {
                            Op::Load(slot)
                        }
                    }
                    "jmp" => Op::Jump(arg),
                    _ => Op::JumpIfFalse(arg),
                }
            }
            t if NUMBER_REGEX.is_match(t) => {
                let value: f64 = t.parse().map_err(|_| ParseError::InvalidArgument {
                    position,
                    token: t.to_string(),
                })?;
                Op::PushConstant(value)
            }
            t if IDENT_REGEX.is_match(t) => {
                let idx = allowed_variables
                    .iter()
                    .position(|name| *name == t)
                    .ok_or_else(|| ParseError::DisallowedIdentifier {
                        position,
                        name: t.to_string(),
                    })?;
                Op::PushVar(idx)
            }
            t => {
                return Err(ParseError::UnknownToken {
                    position,
                    token: t.to_string(),
                });
            }
        };
        program.push(op);
        position += 1;
    }

    if program.is_empty() {
        return Err(ParseError::EmptyProgram);
    }
    if program.len() > max_len {
        return Err(ParseError::ProgramTooLong {
            len: program.len(),
            max: max_len,
        });
    }
    for op in &program {
        if let Op::Jump(target) | Op::JumpIfFalse(target) = op {
            if *target > program.len() {
                return Err(ParseError::JumpOutOfRange {
                    target: *target,
                    len: program.len(),
                });
            }
        }
    }

    Ok(program)
}
