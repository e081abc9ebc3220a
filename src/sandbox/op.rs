/// Instruction set of the sandbox interpreter.
///
/// There is no instruction reaching outside the interpreter: the only external
/// values a program can read are host variables the embedder explicitly allowed.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // --- Data Loading & State Management ---
    PushConstant(f64),
    /// Index into the host context's allow-listed variables
    PushVar(usize),
    Store(u8),
    Load(u8),

    // --- Operators ---
    Add,
    Subtract,
    Multiply,
    Divide, // yields 0 on a zero divisor
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Equal,
    And,
    Or,
    Not,

    // --- Pure builtins ---
    Abs,
    Negate,
    Min,
    Max,

    // --- Control Flow ---
    JumpIfFalse(usize),
    Jump(usize),
    Return,
}
