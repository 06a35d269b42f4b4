//! Compiled-code objects
//!
//! The immutable unit produced by the bytecode compiler: a header, a
//! literal table and the bytecode stream. The interpreter only reads these;
//! construction happens in the compiler (or in
//! [`util::test_helpers`](crate::util) for tests).

use std::rc::Rc;

use crate::consts::*;

bitflags::bitflags! {
    /// Per-compiled-code switches consumed by the dispatch loop.
    pub struct CodeFlags: u16 {
        /// Code body is strict mode.
        const STRICT_MODE = 0x0001;
        /// The unit is a function body (not global/eval/module code).
        const FUNCTION = 0x0002;
        /// Arrow function: `this` is captured lexically at creation.
        const ARROW = 0x0004;
        /// Generator function: invocation materializes an executable
        /// object instead of running the body.
        const GENERATOR = 0x0008;
        /// Global/eval code needs a lexical block for top-level `let`.
        const LEXICAL_BLOCK_NEEDED = 0x0010;
        /// Surplus arguments are collected into the register after the
        /// last named argument.
        const REST_PARAMETER = 0x0020;
        /// Header counts exceed the narrow (8-bit) header layout.
        const UINT16_ARGUMENTS = 0x0040;
        /// Literal indices use the wide encoding window.
        const FULL_LITERAL_ENCODING = 0x0080;
        /// Literal table lives in a static snapshot region; bytecode is
        /// not released when an eval completes. Accepted for format
        /// compatibility; shared ownership makes the release implicit.
        const STATIC_FUNCTION = 0x0100;
        /// Class constructor body; must be invoked with `new`.
        const CLASS_CONSTRUCTOR = 0x0200;
        /// Derived class constructor: `this` stays uninitialized until
        /// `super()` binds it.
        const DERIVED_CONSTRUCTOR = 0x0400;
    }
}

/// One slot of the literal table.
///
/// The table is contiguous and ordered: identifiers, then constant
/// primitives, then sub-function/regexp units. Indices below
/// `register_end` address frame registers and never reach the table.
#[derive(Debug, Clone)]
pub enum Literal {
    /// Variable name, resolved against the lexical environment chain.
    Ident(Rc<str>),
    /// Unboxed integer constant.
    Integer(i32),
    /// Double constant, boxed at reference time.
    Number(f64),
    /// String constant.
    Str(Rc<str>),
    /// Nested compiled code, materialized into a fresh function object at
    /// reference time.
    Function(Rc<CompiledCode>),
    /// Regular expression source, materialized into a fresh regexp object
    /// at reference time.
    Regexp(Rc<str>),
}

/// Header, literal table and bytecode stream of one compilation unit.
#[derive(Debug, Clone)]
pub struct CompiledCode {
    /// Header switches.
    pub flags: CodeFlags,
    /// Formal parameters occupy registers `0..argument_end`.
    pub argument_end: u16,
    /// Literal indices below this bound address frame registers.
    pub register_end: u16,
    /// Literal indices below this bound (and at least `register_end`) are
    /// identifier names.
    pub ident_end: u16,
    /// Literal indices below this bound are constant primitives.
    pub const_literal_end: u16,
    /// One past the last literal index; the tail segment holds
    /// sub-functions and regexps.
    pub literal_end: u16,
    /// Compiler-computed operand stack bound, context records included.
    pub stack_limit: u16,
    /// Literal table for indices `register_end..literal_end`.
    pub literals: Vec<Literal>,
    /// The bytecode stream.
    pub bytecode: Vec<u8>,
}

impl CompiledCode {
    /// Whether the body runs in strict mode.
    pub const fn is_strict(&self) -> bool {
        self.flags.contains(CodeFlags::STRICT_MODE)
    }

    /// Literal-index decoding window selected by the header.
    pub const fn encoding(&self) -> (u16, u16) {
        if self.flags.contains(CodeFlags::FULL_LITERAL_ENCODING) {
            (FULL_LITERAL_ENCODING_LIMIT, FULL_LITERAL_ENCODING_DELTA)
        } else {
            (SMALL_LITERAL_ENCODING_LIMIT, SMALL_LITERAL_ENCODING_DELTA)
        }
    }

    /// Resolve a literal index into the table.
    ///
    /// The index must be at least `register_end`; register indices are
    /// resolved against the frame, not the table.
    pub fn literal(&self, index: u16) -> &Literal {
        debug_assert!(index >= self.register_end && index < self.literal_end);
        &self.literals[(index - self.register_end) as usize]
    }

    /// Identifier name behind a literal index.
    pub fn ident(&self, index: u16) -> &Rc<str> {
        debug_assert!(index >= self.register_end && index < self.ident_end);
        match self.literal(index) {
            Literal::Ident(name) => name,
            other => unreachable!("ident segment holds {other:?}"),
        }
    }

    /// Value slots a frame over this code requires: the register file plus
    /// the operand stack bound.
    pub fn frame_size(&self) -> usize {
        self.register_end as usize + self.stack_limit as usize
    }
}
