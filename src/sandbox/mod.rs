//! Isolation boundary for agent-supplied code.
//!
//! Source is compiled by [`parser::parse_program`] into a small stack-machine
//! instruction set and run by [`engine::VirtualMachine`] under a wall-clock
//! deadline, an instruction budget and an operand-stack ceiling. Programs can
//! only observe the host variables the caller puts in a [`HostContext`].
//!
//! # Example
//! ```
//! use evoforge::sandbox::{HostContext, Sandbox};
//!
//! let sandbox = Sandbox::default();
//! let context = HostContext::new().with("fitness", 4.0);
//! assert_eq!(sandbox.execute("fitness 2 /", &context).unwrap(), 2.0);
//! assert!(sandbox.execute("open_socket", &context).is_err());
//! ```

pub mod engine;
pub mod op;
pub mod parser;

use crate::config::SandboxConfig;
use engine::{ExecutionLimits, VirtualMachine, VmError};
use op::Op;
use parser::{parse_program, ParseError};
use std::time::Duration;
use thiserror::Error;

/// Which budget an execution ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLimit {
    Fuel,
    Stack,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("Rejected program: {0}")]
    Parse(#[from] ParseError),
    #[error("Execution exceeded its {limit:?} time budget (aborted after {elapsed:?})")]
    Timeout { limit: Duration, elapsed: Duration },
    #[error("Execution exceeded its {0:?} budget")]
    Resource(ResourceLimit),
    #[error("Execution failed: {0:?}")]
    Execution(VmError),
}

impl SandboxError {
    fn from_vm(error: VmError, limits: &ExecutionLimits) -> Self {
        match error {
            VmError::DeadlineExceeded { elapsed } => SandboxError::Timeout {
                limit: limits.timeout,
                elapsed,
            },
            VmError::FuelExhausted { .. } => SandboxError::Resource(ResourceLimit::Fuel),
            VmError::StackOverflow => SandboxError::Resource(ResourceLimit::Stack),
            other => SandboxError::Execution(other),
        }
    }
}

/// Allow-listed host variables visible to a program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostContext {
    names: Vec<&'static str>,
    values: Vec<f64>,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes (or overwrites) a named variable.
    pub fn with(mut self, name: &'static str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &'static str, value: f64) {
        match self.names.iter().position(|n| *n == name) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.names.push(name);
                self.values.push(value);
            }
        }
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }
}

/// A program that passed validation, bound to the variable names it was compiled against.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    ops: Vec<Op>,
    variables: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    limits: ExecutionLimits,
    max_program_len: usize,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl Sandbox {
    pub fn new(limits: ExecutionLimits, max_program_len: usize) -> Self {
        Self {
            limits,
            max_program_len,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            ExecutionLimits {
                timeout: Duration::from_millis(config.timeout_ms),
                fuel: config.fuel,
                stack_capacity: config.stack_capacity,
            },
            config.max_program_len,
        )
    }

    /// Validates `source` against the variables a context will provide.
    pub fn compile(&self, source: &str, variables: &[&'static str]) -> Result<CompiledProgram, SandboxError> {
        let ops = parse_program(source, variables, self.max_program_len)?;
        Ok(CompiledProgram {
            ops,
            variables: variables.to_vec(),
        })
    }

    /// Compiles and runs `source` in one step.
    pub fn execute(&self, source: &str, context: &HostContext) -> Result<f64, SandboxError> {
        let program = self.compile(source, context.names())?;
        self.run(&program, context)
    }

    /// Runs a compiled program. Variables are looked up by name so a context
    /// built in a different order still binds correctly; a missing variable is
    /// an execution error.
    pub fn run(&self, program: &CompiledProgram, context: &HostContext) -> Result<f64, SandboxError> {
        let mut bound = Vec::with_capacity(program.variables.len());
        for (idx, name) in program.variables.iter().enumerate() {
            let value = context
                .names
                .iter()
                .position(|n| n == name)
                .map(|i| context.values[i])
                .ok_or(SandboxError::Execution(VmError::UnknownVariable(idx)))?;
            bound.push(value);
        }

        let mut vm = VirtualMachine::new(self.limits);
        vm.execute(&program.ops, &bound)
            .map_err(|e| SandboxError::from_vm(e, &self.limits))
    }
}
