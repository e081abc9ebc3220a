use crate::sandbox::op::Op;
use std::time::{Duration, Instant};

pub const MEMORY_SIZE: usize = 16;
/// The wall clock is consulted once per this many instructions.
const DEADLINE_CHECK_INTERVAL: u64 = 64;

/// Resource budget of a single execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    /// Maximum number of instructions executed
    pub fuel: u64,
    /// Maximum operand stack depth
    pub stack_capacity: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5),
            fuel: 10_000,
            stack_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    StackOverflow,
    StackUnderflow,
    MemoryOutOfBounds(u8),
    UnknownVariable(usize),
    FuelExhausted { executed: u64 },
    DeadlineExceeded { elapsed: Duration },
    NonFiniteResult,
    InvalidProgram,
}

/// Stack machine executing already-validated programs within fixed limits.
pub struct VirtualMachine {
    stack: Vec<f64>,
    memory: [f64; MEMORY_SIZE],
    limits: ExecutionLimits,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl VirtualMachine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            stack: Vec::with_capacity(limits.stack_capacity),
            memory: [0.0; MEMORY_SIZE],
            limits,
        }
    }

    pub fn execute(&mut self, program: &[Op], variables: &[f64]) -> Result<f64, VmError> {
        self.stack.clear();
        self.memory = [0.0; MEMORY_SIZE];
        let started = Instant::now();
        let mut executed: u64 = 0;
        let mut pc = 0;

        while pc < program.len() {
            if executed >= self.limits.fuel {
                return Err(VmError::FuelExhausted { executed });
            }
            executed += 1;
            if executed % DEADLINE_CHECK_INTERVAL == 0 {
                let elapsed = started.elapsed();
                if elapsed > self.limits.timeout {
                    return Err(VmError::DeadlineExceeded { elapsed });
                }
            }

            let op = &program[pc];
            pc += 1;
            match op {
                Op::PushConstant(val) => self.push(*val)?,
                Op::PushVar(idx) => {
                    let val = variables
                        .get(*idx)
                        .copied()
                        .ok_or(VmError::UnknownVariable(*idx))?;
                    self.push(val)?;
                }
                Op::Store(idx) => {
                    let val = self.pop()?;
                    if let Some(mem_slot) = self.memory.get_mut(*idx as usize) {
                        *mem_slot = val;
                    } else {
                        return Err(VmError::MemoryOutOfBounds(*idx));
                    }
                }
                Op::Load(idx) => {
                    if let Some(val) = self.memory.get(*idx as usize) {
                        self.push(*val)?;
                    } else {
                        return Err(VmError::MemoryOutOfBounds(*idx));
                    }
                }
                Op::Add => self.apply_binary_op(|a, b| a + b)?,
                Op::Subtract => self.apply_binary_op(|a, b| a - b)?,
                Op::Multiply => self.apply_binary_op(|a, b| a * b)?,
                Op::Divide => self.apply_binary_op(|a, b| if b.abs() < 1e-9 { 0.0 } else { a / b })?,
                Op::GreaterThan => self.apply_binary_op(|a, b| (a > b) as i32 as f64)?,
                Op::LessThan => self.apply_binary_op(|a, b| (a < b) as i32 as f64)?,
                Op::GreaterThanOrEqual => self.apply_binary_op(|a, b| (a >= b) as i32 as f64)?,
                Op::LessThanOrEqual => self.apply_binary_op(|a, b| (a <= b) as i32 as f64)?,
                Op::Equal => self.apply_binary_op(|a, b| (a == b) as i32 as f64)?,
                Op::And => self.apply_binary_op(|a, b| ((a > 0.0) && (b > 0.0)) as i32 as f64)?,
                Op::Or => self.apply_binary_op(|a, b| ((a > 0.0) || (b > 0.0)) as i32 as f64)?,
                Op::Min => self.apply_binary_op(f64::min)?,
                Op::Max => self.apply_binary_op(f64::max)?,
                Op::Not => self.apply_unary_op(|v| (v == 0.0) as i32 as f64)?,
                Op::Abs => self.apply_unary_op(f64::abs)?,
                Op::Negate => self.apply_unary_op(|v| -v)?,
                Op::JumpIfFalse(target) => {
                    let condition = self.pop()?;
                    if condition == 0.0 {
                        pc = *target;
                    }
                }
                Op::Jump(target) => pc = *target,
                Op::Return => break,
            }
        }

        let result = self.pop().or(Err(VmError::InvalidProgram))?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(VmError::NonFiniteResult)
        }
    }

    #[inline]
    fn push(&mut self, val: f64) -> Result<(), VmError> {
        if self.stack.len() < self.limits.stack_capacity {
            self.stack.push(val);
            Ok(())
        } else {
            Err(VmError::StackOverflow)
        }
    }

    #[inline]
    fn pop(&mut self) -> Result<f64, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    #[inline]
    fn apply_unary_op<F>(&mut self, op: F) -> Result<(), VmError>
    where
        F: Fn(f64) -> f64,
    {
        let v = self.pop()?;
        self.push(op(v))
    }

    #[inline]
    fn apply_binary_op<F>(&mut self, op: F) -> Result<(), VmError>
    where
        F: Fn(f64, f64) -> f64,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(op(a, b))
    }
}
