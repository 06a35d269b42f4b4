//! Opcode tables and descriptors
//!
//! Every opcode resolves to a packed descriptor: an operand-source group,
//! a result disposition, a branch length/direction and a semantic group
//! index. The dispatch loop decodes one byte (or two for extended opcodes)
//! and switches on the semantic group; the descriptor tells it how to
//! materialize operands and where the result goes.

bitflags::bitflags! {
    /// Result disposition of an opcode.
    ///
    /// Most groups place their own result; the flags drive the shared
    /// epilogue used by assignments, increments and the call protocol.
    pub struct PutMode: u8 {
        /// Push the result to the operand stack.
        const STACK = 0x01;
        /// Move the result into the frame's block-result register.
        const BLOCK = 0x02;
        /// Write the result to the named binding whose literal index
        /// follows the operands.
        const IDENT = 0x04;
        /// Write the result through the `(base, property)` pair popped
        /// from the stack.
        const REFERENCE = 0x08;
    }
}

/// Operand-source group of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandMode {
    /// No implicit operands.
    None,
    /// `left` popped from the stack.
    Stack,
    /// `left` and `right` popped from the stack.
    StackStack,
    /// `left` read through a literal index.
    Literal,
    /// `left` and `right` read through two literal indices.
    LiteralLiteral,
    /// `left` popped from the stack, `right` read through a literal index.
    StackLiteral,
    /// `left` is the frame's this-binding, `right` a literal.
    ThisLiteral,
    /// A relative branch offset follows the opcode.
    Branch,
}

/// Semantic group executed by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum OpGroup {
    Pop,
    PopBlock,
    Push,
    PushTwo,
    PushThree,
    PushUndefined,
    PushTrue,
    PushFalse,
    PushNull,
    PushThis,
    PushZero,
    PushPosByte,
    PushNegByte,
    PushObject,
    PushArray,
    PushElision,
    AppendArray,
    NamedFuncExpr,
    CreateBinding,
    VarEval,
    InitArgOrFunc,
    CheckVar,
    CheckLet,
    AssignLetConst,
    InitBinding,
    ThrowConstError,
    MovIdent,
    IdentReference,
    TypeofIdent,
    DeleteIdent,
    Assign,
    PropGet,
    PropReference,
    PropDelete,
    SetProperty,
    SetGetter,
    SetSetter,
    RequireObjectCoercible,
    PreIncr,
    PreDecr,
    PostIncr,
    PostDecr,
    PropPreIncr,
    PropPreDecr,
    PropPostIncr,
    PropPostDecr,
    UnaryPlus,
    UnaryMinus,
    LogicalNot,
    BitNot,
    Void,
    Typeof,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    LeftShift,
    RightShift,
    UnsRightShift,
    In,
    InstanceOf,
    Jump,
    BranchIfTrue,
    BranchIfFalse,
    BranchIfLogicalTrue,
    BranchIfLogicalFalse,
    BranchIfStrictEqual,
    JumpAndExitContext,
    Return,
    Throw,
    ThrowReferenceError,
    Call,
    New,
    ResolveBaseForCall,
    Try,
    Catch,
    Finally,
    ContextEnd,
    With,
    BlockCreateContext,
    CloneContext,
    ForInInit,
    ForInGetNext,
    ForInHasNext,
    ForOfInit,
    ForOfGetNext,
    ForOfHasNext,
    ExtPrefix,
    ExtError,
    SuperCall,
    SpreadArguments,
    PushSpreadElement,
    GetIterator,
    IteratorStep,
    IteratorClose,
    RestInitializer,
    DefaultInitializer,
    CreateGenerator,
    Yield,
    Await,
    PushNewTarget,
    PushImplicitConstructor,
    PushSuperConstructor,
    ResolveLexicalThis,
    InitClass,
    FinalizeClass,
    StringConcat,
    TryCreateEnv,
    Line,
    BreakpointEnabled,
    BreakpointDisabled,
}

/// Decoded opcode descriptor.
#[derive(Debug, Clone, Copy)]
pub struct OpMeta {
    /// Semantic group index.
    pub group: OpGroup,
    /// Operand-source group.
    pub operands: OperandMode,
    /// Result disposition for the shared epilogue.
    pub put: PutMode,
    /// Branch offset length in bytes; zero for non-branch opcodes.
    pub branch_length: u8,
    /// Whether the branch offset points backwards.
    pub backward_branch: bool,
}

macro_rules! put_mode {
    (N) => {
        PutMode::empty()
    };
    (S) => {
        PutMode::STACK
    };
    (B) => {
        PutMode::BLOCK
    };
    (I) => {
        PutMode::IDENT
    };
    (R) => {
        PutMode::REFERENCE
    };
    (IS) => {
        PutMode::from_bits_truncate(PutMode::IDENT.bits() | PutMode::STACK.bits())
    };
    (IB) => {
        PutMode::from_bits_truncate(PutMode::IDENT.bits() | PutMode::BLOCK.bits())
    };
    (RS) => {
        PutMode::from_bits_truncate(PutMode::REFERENCE.bits() | PutMode::STACK.bits())
    };
    (RB) => {
        PutMode::from_bits_truncate(PutMode::REFERENCE.bits() | PutMode::BLOCK.bits())
    };
}

macro_rules! branch_mode {
    (none) => {
        (0u8, false)
    };
    (fwd1) => {
        (1u8, false)
    };
    (fwd2) => {
        (2u8, false)
    };
    (fwd3) => {
        (3u8, false)
    };
    (bwd1) => {
        (1u8, true)
    };
    (bwd2) => {
        (2u8, true)
    };
    (bwd3) => {
        (3u8, true)
    };
}

macro_rules! opcode_table {
    (
        $(#[$enum_meta:meta])*
        pub enum $enum_name:ident {
            $(
                $(#[doc = $doc:literal])*
                $variant:ident => ($group:ident, $operands:ident, $put:tt, $branch:ident),
            )*
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $enum_name {
            $(
                $(#[doc = $doc])*
                $variant,
            )*
        }

        impl $enum_name {
            /// Number of defined opcodes.
            pub const COUNT: usize = [$($enum_name::$variant),*].len();

            /// Decode a bytecode byte.
            #[inline]
            pub fn from_byte(byte: u8) -> Option<Self> {
                if (byte as usize) < Self::COUNT {
                    // Safety: repr(u8) with contiguous discriminants
                    // starting at zero, bounds-checked above.
                    Some(unsafe { core::mem::transmute::<u8, Self>(byte) })
                } else {
                    None
                }
            }

            /// Opcode descriptor.
            pub const fn meta(self) -> OpMeta {
                match self {
                    $(
                        $enum_name::$variant => OpMeta {
                            group: OpGroup::$group,
                            operands: OperandMode::$operands,
                            put: put_mode!($put),
                            branch_length: branch_mode!($branch).0,
                            backward_branch: branch_mode!($branch).1,
                        },
                    )*
                }
            }
        }
    };
}

opcode_table! {
    /// Primary opcode table.
    pub enum Opcode {
        /// Pop and release the stack top.
        Pop => (Pop, None, N, none),
        /// Pop the stack top into the block-result register.
        PopBlock => (PopBlock, None, N, none),
        PushLiteral => (Push, Literal, N, none),
        PushTwoLiterals => (PushTwo, LiteralLiteral, N, none),
        PushThreeLiterals => (PushThree, LiteralLiteral, N, none),
        PushUndefined => (PushUndefined, None, N, none),
        PushTrue => (PushTrue, None, N, none),
        PushFalse => (PushFalse, None, N, none),
        PushNull => (PushNull, None, N, none),
        PushThis => (PushThis, None, N, none),
        PushZero => (PushZero, None, N, none),
        /// Push the byte operand plus one as an integer.
        PushPosByte => (PushPosByte, None, N, none),
        /// Push the negated byte operand minus one as an integer.
        PushNegByte => (PushNegByte, None, N, none),
        /// Push a fresh empty plain object.
        PushObject => (PushObject, None, N, none),
        /// Push a fresh empty fast array.
        PushArray => (PushArray, None, N, none),
        PushElision => (PushElision, None, N, none),
        /// Append the topmost `count` values (byte operand) to the array
        /// below them, expanding spread elements.
        AppendArray => (AppendArray, None, N, none),
        /// Install the self-binding environment of a named function
        /// expression.
        PushNamedFuncExpr => (NamedFuncExpr, LiteralLiteral, N, none),

        CreateVar => (CreateBinding, None, N, none),
        CreateLet => (CreateBinding, None, N, none),
        CreateConst => (CreateBinding, None, N, none),
        /// Hoisting declaration for eval code; skips block environments.
        CreateVarEval => (VarEval, None, N, none),
        /// Hoisting declaration initialized with a function literal.
        CreateVarFuncEval => (VarEval, None, N, none),
        InitArgOrFunc => (InitArgOrFunc, None, N, none),
        CheckVar => (CheckVar, None, N, none),
        CheckLet => (CheckLet, None, N, none),
        /// Initialize a declared-but-uninitialized `let`/`const` binding.
        AssignLetConst => (AssignLetConst, Stack, N, none),
        InitLet => (InitBinding, None, N, none),
        InitConst => (InitBinding, None, N, none),
        ThrowConstError => (ThrowConstError, None, N, none),
        /// Move the stack top into a register.
        MovIdent => (MovIdent, Stack, N, none),
        /// Push the `(base, name, value)` reference triple of an
        /// identifier, or the register-ref form for register-backed
        /// bindings.
        IdentReference => (IdentReference, None, N, none),
        TypeofIdent => (TypeofIdent, None, N, none),
        DeleteIdent => (DeleteIdent, None, N, none),

        Assign => (Assign, Stack, R, none),
        AssignPush => (Assign, Stack, RS, none),
        AssignBlock => (Assign, Stack, RB, none),
        AssignIdent => (Assign, Stack, I, none),
        AssignIdentPush => (Assign, Stack, IS, none),
        AssignIdentBlock => (Assign, Stack, IB, none),
        AssignLiteralIdent => (Assign, Literal, I, none),

        PropGet => (PropGet, StackStack, N, none),
        PropGetLiteral => (PropGet, StackLiteral, N, none),
        PropGetTwoLiterals => (PropGet, LiteralLiteral, N, none),
        PropGetThisLiteral => (PropGet, ThisLiteral, N, none),
        /// Like the get forms, but keeps `(base, property)` on the stack
        /// for a later reference write.
        PushPropReference => (PropReference, None, N, none),
        PushPropLiteralReference => (PropReference, Literal, N, none),
        PushPropLiteralLiteralReference => (PropReference, LiteralLiteral, N, none),
        PushPropThisLiteralReference => (PropReference, ThisLiteral, N, none),
        PropDelete => (PropDelete, StackStack, N, none),
        /// Define a named data property on the object at the stack top.
        SetProperty => (SetProperty, StackLiteral, N, none),
        SetComputedProperty => (SetProperty, StackStack, N, none),
        SetGetter => (SetGetter, StackStack, N, none),
        SetSetter => (SetSetter, StackStack, N, none),
        RequireObjectCoercible => (RequireObjectCoercible, None, N, none),

        PreIncrIdent => (PreIncr, Literal, I, none),
        PreIncrIdentPush => (PreIncr, Literal, IS, none),
        PreDecrIdent => (PreDecr, Literal, I, none),
        PreDecrIdentPush => (PreDecr, Literal, IS, none),
        PostIncrIdent => (PostIncr, Literal, I, none),
        PostIncrIdentPush => (PostIncr, Literal, IS, none),
        PostDecrIdent => (PostDecr, Literal, I, none),
        PostDecrIdentPush => (PostDecr, Literal, IS, none),
        PropPreIncr => (PropPreIncr, None, R, none),
        PropPreIncrPush => (PropPreIncr, None, RS, none),
        PropPreDecr => (PropPreDecr, None, R, none),
        PropPreDecrPush => (PropPreDecr, None, RS, none),
        PropPostIncr => (PropPostIncr, None, R, none),
        PropPostIncrPush => (PropPostIncr, None, RS, none),
        PropPostDecr => (PropPostDecr, None, R, none),
        PropPostDecrPush => (PropPostDecr, None, RS, none),

        UnaryPlus => (UnaryPlus, Stack, N, none),
        UnaryMinus => (UnaryMinus, Stack, N, none),
        LogicalNot => (LogicalNot, Stack, N, none),
        BitNot => (BitNot, Stack, N, none),
        Void => (Void, Stack, N, none),
        Typeof => (Typeof, Stack, N, none),

        Add => (Add, StackStack, N, none),
        AddRightLiteral => (Add, StackLiteral, N, none),
        AddTwoLiterals => (Add, LiteralLiteral, N, none),
        Sub => (Sub, StackStack, N, none),
        SubRightLiteral => (Sub, StackLiteral, N, none),
        SubTwoLiterals => (Sub, LiteralLiteral, N, none),
        Mul => (Mul, StackStack, N, none),
        MulRightLiteral => (Mul, StackLiteral, N, none),
        MulTwoLiterals => (Mul, LiteralLiteral, N, none),
        Div => (Div, StackStack, N, none),
        DivRightLiteral => (Div, StackLiteral, N, none),
        DivTwoLiterals => (Div, LiteralLiteral, N, none),
        Mod => (Mod, StackStack, N, none),
        ModRightLiteral => (Mod, StackLiteral, N, none),
        ModTwoLiterals => (Mod, LiteralLiteral, N, none),
        Exp => (Exp, StackStack, N, none),
        Equal => (Equal, StackStack, N, none),
        NotEqual => (NotEqual, StackStack, N, none),
        StrictEqual => (StrictEqual, StackStack, N, none),
        StrictNotEqual => (StrictNotEqual, StackStack, N, none),
        Less => (Less, StackStack, N, none),
        LessRightLiteral => (Less, StackLiteral, N, none),
        LessTwoLiterals => (Less, LiteralLiteral, N, none),
        Greater => (Greater, StackStack, N, none),
        GreaterRightLiteral => (Greater, StackLiteral, N, none),
        GreaterTwoLiterals => (Greater, LiteralLiteral, N, none),
        LessEqual => (LessEqual, StackStack, N, none),
        LessEqualRightLiteral => (LessEqual, StackLiteral, N, none),
        LessEqualTwoLiterals => (LessEqual, LiteralLiteral, N, none),
        GreaterEqual => (GreaterEqual, StackStack, N, none),
        GreaterEqualRightLiteral => (GreaterEqual, StackLiteral, N, none),
        GreaterEqualTwoLiterals => (GreaterEqual, LiteralLiteral, N, none),
        BitAnd => (BitAnd, StackStack, N, none),
        BitOr => (BitOr, StackStack, N, none),
        BitXor => (BitXor, StackStack, N, none),
        LeftShift => (LeftShift, StackStack, N, none),
        RightShift => (RightShift, StackStack, N, none),
        UnsRightShift => (UnsRightShift, StackStack, N, none),
        In => (In, StackStack, N, none),
        InstanceOf => (InstanceOf, StackStack, N, none),

        JumpForward => (Jump, Branch, N, fwd1),
        JumpForward2 => (Jump, Branch, N, fwd2),
        JumpForward3 => (Jump, Branch, N, fwd3),
        JumpBackward => (Jump, Branch, N, bwd1),
        JumpBackward2 => (Jump, Branch, N, bwd2),
        JumpBackward3 => (Jump, Branch, N, bwd3),
        BranchIfTrueForward => (BranchIfTrue, Branch, N, fwd1),
        BranchIfTrueForward2 => (BranchIfTrue, Branch, N, fwd2),
        BranchIfTrueForward3 => (BranchIfTrue, Branch, N, fwd3),
        BranchIfTrueBackward => (BranchIfTrue, Branch, N, bwd1),
        BranchIfTrueBackward2 => (BranchIfTrue, Branch, N, bwd2),
        BranchIfTrueBackward3 => (BranchIfTrue, Branch, N, bwd3),
        BranchIfFalseForward => (BranchIfFalse, Branch, N, fwd1),
        BranchIfFalseForward2 => (BranchIfFalse, Branch, N, fwd2),
        BranchIfFalseForward3 => (BranchIfFalse, Branch, N, fwd3),
        BranchIfFalseBackward => (BranchIfFalse, Branch, N, bwd1),
        BranchIfFalseBackward2 => (BranchIfFalse, Branch, N, bwd2),
        BranchIfFalseBackward3 => (BranchIfFalse, Branch, N, bwd3),
        /// `||`: the tested value stays on the stack when the branch is
        /// taken.
        BranchIfLogicalTrue => (BranchIfLogicalTrue, Branch, N, fwd1),
        BranchIfLogicalTrue2 => (BranchIfLogicalTrue, Branch, N, fwd2),
        BranchIfLogicalTrue3 => (BranchIfLogicalTrue, Branch, N, fwd3),
        /// `&&`: the tested value stays on the stack when the branch is
        /// taken.
        BranchIfLogicalFalse => (BranchIfLogicalFalse, Branch, N, fwd1),
        BranchIfLogicalFalse2 => (BranchIfLogicalFalse, Branch, N, fwd2),
        BranchIfLogicalFalse3 => (BranchIfLogicalFalse, Branch, N, fwd3),
        /// Switch dispatch: compares against the value below the popped
        /// operand and keeps it for the next case on mismatch.
        BranchIfStrictEqual => (BranchIfStrictEqual, Branch, N, fwd1),
        BranchIfStrictEqual2 => (BranchIfStrictEqual, Branch, N, fwd2),
        BranchIfStrictEqual3 => (BranchIfStrictEqual, Branch, N, fwd3),
        /// Break/continue crossing context records; unwinds through
        /// pending finally blocks.
        JumpAndExitContext => (JumpAndExitContext, Branch, N, fwd2),

        Return => (Return, Stack, N, none),
        ReturnWithBlock => (Return, None, N, none),
        ReturnWithLiteral => (Return, Literal, N, none),
        Throw => (Throw, Stack, N, none),
        ThrowReferenceError => (ThrowReferenceError, None, N, none),

        Call => (Call, None, N, none),
        CallPush => (Call, None, S, none),
        CallBlock => (Call, None, B, none),
        CallProp => (Call, None, N, none),
        CallPropPush => (Call, None, S, none),
        CallPropBlock => (Call, None, B, none),
        New => (New, None, S, none),
        /// Replace a lexical-environment base with its implicit this
        /// value before a property call.
        ResolveBaseForCall => (ResolveBaseForCall, None, N, none),

        Try => (Try, Branch, N, fwd2),
        Catch => (Catch, Branch, N, fwd2),
        Finally => (Finally, Branch, N, fwd2),
        ContextEnd => (ContextEnd, None, N, none),
        With => (With, Branch, N, fwd2),
        BlockCreateContext => (BlockCreateContext, Branch, N, fwd2),
        CloneContext => (CloneContext, None, N, none),
        CloneFullContext => (CloneContext, None, N, none),
        ForInInit => (ForInInit, Branch, N, fwd2),
        ForInGetNext => (ForInGetNext, None, N, none),
        ForInHasNext => (ForInHasNext, Branch, N, bwd2),
        ForOfInit => (ForOfInit, Branch, N, fwd2),
        ForOfGetNext => (ForOfGetNext, None, N, none),
        ForOfHasNext => (ForOfHasNext, Branch, N, bwd2),

        /// Prefix byte selecting the extended opcode table.
        ExtPrefix => (ExtPrefix, None, N, none),
    }
}

opcode_table! {
    /// Extended opcode table, keyed by the byte following
    /// [`Opcode::ExtPrefix`].
    pub enum ExtOpcode {
        /// Sentinel sequence entered when a parked call operation failed;
        /// re-entering the loop triggers exception handling immediately.
        Error => (ExtError, None, N, none),
        SuperCall => (SuperCall, None, N, none),
        SpreadSuperCall => (SuperCall, None, N, none),
        SpreadCall => (SpreadArguments, None, N, none),
        SpreadCallPush => (SpreadArguments, None, S, none),
        SpreadCallBlock => (SpreadArguments, None, B, none),
        SpreadCallProp => (SpreadArguments, None, N, none),
        SpreadCallPropPush => (SpreadArguments, None, S, none),
        SpreadCallPropBlock => (SpreadArguments, None, B, none),
        SpreadNew => (SpreadArguments, None, S, none),
        PushSpreadElement => (PushSpreadElement, None, N, none),
        GetIterator => (GetIterator, None, N, none),
        IteratorStep => (IteratorStep, None, N, none),
        IteratorStep2 => (IteratorStep, None, N, none),
        IteratorStep3 => (IteratorStep, None, N, none),
        IteratorClose => (IteratorClose, Stack, N, none),
        RestInitializer => (RestInitializer, None, N, none),
        RestInitializer2 => (RestInitializer, None, N, none),
        RestInitializer3 => (RestInitializer, None, N, none),
        /// Destructuring default: branch over the initializer when the
        /// stack top is not `undefined`.
        DefaultInitializer => (DefaultInitializer, Branch, N, fwd2),
        CreateGenerator => (CreateGenerator, None, N, none),
        Yield => (Yield, None, N, none),
        /// Placeholder: suspends like `Yield` until an async runtime
        /// resumes the executable object.
        Await => (Await, None, N, none),
        PushNewTarget => (PushNewTarget, None, N, none),
        PushImplicitConstructor => (PushImplicitConstructor, None, N, none),
        PushSuperConstructor => (PushSuperConstructor, None, N, none),
        ResolveLexicalThis => (ResolveLexicalThis, None, N, none),
        InitClass => (InitClass, None, N, none),
        FinalizeClass => (FinalizeClass, None, N, none),
        StringConcat => (StringConcat, StackStack, N, none),
        /// Mark the active try/catch/finally record as owning a lexical
        /// environment.
        TryCreateEnv => (TryCreateEnv, None, N, none),
        /// Line-number update; 7-bit varint operand.
        Line => (Line, None, N, none),
        BreakpointEnabled => (BreakpointEnabled, None, N, none),
        BreakpointDisabled => (BreakpointDisabled, None, N, none),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op as u8, byte);
            } else {
                assert!(byte as usize >= Opcode::COUNT);
            }
        }
        assert!(Opcode::COUNT <= 256);
        assert!(ExtOpcode::COUNT <= 256);
    }

    #[test]
    fn branch_descriptors_carry_lengths() {
        assert_eq!(Opcode::JumpForward.meta().branch_length, 1);
        assert_eq!(Opcode::JumpForward3.meta().branch_length, 3);
        assert!(Opcode::JumpBackward2.meta().backward_branch);
        assert!(!Opcode::Try.meta().backward_branch);
        assert_eq!(Opcode::Add.meta().branch_length, 0);
    }

    #[test]
    fn assignment_dispositions() {
        assert_eq!(Opcode::Assign.meta().put, PutMode::REFERENCE);
        assert!(Opcode::AssignIdentPush
            .meta()
            .put
            .contains(PutMode::IDENT | PutMode::STACK));
        assert!(Opcode::CallBlock.meta().put.contains(PutMode::BLOCK));
    }
}
