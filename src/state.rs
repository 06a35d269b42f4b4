//! Runtime state representation for the VM

use crate::value::Value;

/// Parked operation of a frame whose dispatch loop returned to the driver.
///
/// The loop never invokes user functions from inside its own switch; it
/// parks the bytecode cursor at the instruction, records the operation here
/// and returns. The driver performs the operation and re-enters the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallOperation {
    /// No operation parked; the frame completed.
    #[default]
    None,
    /// A `Call` family opcode.
    Call,
    /// A `New` opcode.
    Construct,
    /// A `super(...)` call.
    SuperCall,
    /// A spread call/construct with a collected argument list.
    Spread,
    /// The frame suspended with a value (yield/await).
    Return,
    /// A generator invocation must capture this frame into an executable
    /// object.
    MakeGenerator,
}

/// Outcome of resuming a suspended executable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStep {
    /// The body suspended again at a yield point.
    Yielded(Value),
    /// The body ran to completion with the given value.
    Done(Value),
}

impl GeneratorStep {
    /// The carried value, regardless of completion state.
    pub const fn value(&self) -> Value {
        match self {
            Self::Yielded(value) | Self::Done(value) => *value,
        }
    }

    /// Whether the executable object is exhausted.
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}
