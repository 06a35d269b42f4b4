//! Crate utilities

/// Test helpers: a small assembler producing [`CompiledCode`] units the
/// way the bytecode compiler would, with label-based branch fixups and a
/// symbolic literal table.
///
/// [`CompiledCode`]: crate::code::CompiledCode
#[cfg(feature = "test-helpers")]
pub mod test_helpers {
    use std::rc::Rc;

    use crate::code::{CodeFlags, CompiledCode, Literal};
    use crate::opcode::{ExtOpcode, Opcode};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum LitKind {
        Register,
        Ident,
        Const,
        Object,
    }

    /// Symbolic literal reference, resolved to a table index at build
    /// time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lit {
        kind: LitKind,
        index: usize,
    }

    /// Branch target handle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Label(usize);

    #[derive(Debug)]
    enum Item {
        Byte(u8),
        Lit(Lit),
        Branch {
            /// Extended branches carry the prefix byte; offsets are
            /// relative to it.
            prefix: Option<u8>,
            opcode: u8,
            length: u8,
            backward: bool,
            label: Label,
        },
    }

    /// Assembler for one compilation unit.
    #[derive(Debug)]
    pub struct CodeBuilder {
        flags: CodeFlags,
        argument_end: u16,
        locals: u16,
        stack_limit: u16,
        idents: Vec<Rc<str>>,
        consts: Vec<Literal>,
        objects: Vec<Literal>,
        items: Vec<Item>,
        labels: Vec<Option<usize>>,
    }

    impl Default for CodeBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CodeBuilder {
        /// Fresh builder with a 32-slot operand stack bound.
        pub fn new() -> Self {
            CodeBuilder {
                flags: CodeFlags::empty(),
                argument_end: 0,
                locals: 0,
                stack_limit: 32,
                idents: Vec::new(),
                consts: Vec::new(),
                objects: Vec::new(),
                items: Vec::new(),
                labels: Vec::new(),
            }
        }

        /// Set header flags.
        pub fn flags(&mut self, flags: CodeFlags) -> &mut Self {
            self.flags |= flags;
            self
        }

        /// Number of formal parameters; they occupy the first registers.
        pub fn arguments(&mut self, count: u16) -> &mut Self {
            self.argument_end = count;
            self
        }

        /// Additional registers past the parameters.
        pub fn locals(&mut self, count: u16) -> &mut Self {
            self.locals = count;
            self
        }

        /// Override the operand stack bound.
        pub fn stack_limit(&mut self, limit: u16) -> &mut Self {
            self.stack_limit = limit;
            self
        }

        fn register_end(&self) -> u16 {
            let end = self.argument_end + self.locals;
            if self.flags.contains(CodeFlags::REST_PARAMETER) {
                end + 1
            } else {
                end
            }
        }

        /// Literal reference to a register slot.
        pub fn register(&self, index: u16) -> Lit {
            debug_assert!(index < self.register_end());
            Lit {
                kind: LitKind::Register,
                index: index as usize,
            }
        }

        /// Identifier literal, deduplicated by name.
        pub fn ident(&mut self, name: &str) -> Lit {
            let index = match self.idents.iter().position(|known| &**known == name) {
                Some(index) => index,
                None => {
                    self.idents.push(Rc::from(name));
                    self.idents.len() - 1
                }
            };
            Lit {
                kind: LitKind::Ident,
                index,
            }
        }

        /// Integer constant literal.
        pub fn integer(&mut self, value: i32) -> Lit {
            self.push_const(Literal::Integer(value))
        }

        /// Double constant literal.
        pub fn number(&mut self, value: f64) -> Lit {
            self.push_const(Literal::Number(value))
        }

        /// String constant literal.
        pub fn string(&mut self, value: &str) -> Lit {
            self.push_const(Literal::Str(Rc::from(value)))
        }

        fn push_const(&mut self, literal: Literal) -> Lit {
            self.consts.push(literal);
            Lit {
                kind: LitKind::Const,
                index: self.consts.len() - 1,
            }
        }

        /// Nested function literal.
        pub fn function(&mut self, code: Rc<CompiledCode>) -> Lit {
            self.objects.push(Literal::Function(code));
            Lit {
                kind: LitKind::Object,
                index: self.objects.len() - 1,
            }
        }

        /// Regexp literal.
        pub fn regexp(&mut self, source: &str) -> Lit {
            self.objects.push(Literal::Regexp(Rc::from(source)));
            Lit {
                kind: LitKind::Object,
                index: self.objects.len() - 1,
            }
        }

        /// Emit a primary opcode.
        pub fn op(&mut self, opcode: Opcode) -> &mut Self {
            debug_assert_eq!(opcode.meta().branch_length, 0, "use branch() for {opcode:?}");
            self.items.push(Item::Byte(opcode as u8));
            self
        }

        /// Emit an extended opcode.
        pub fn ext(&mut self, ext: ExtOpcode) -> &mut Self {
            debug_assert_eq!(ext.meta().branch_length, 0, "use ext_branch() for {ext:?}");
            self.items.push(Item::Byte(Opcode::ExtPrefix as u8));
            self.items.push(Item::Byte(ext as u8));
            self
        }

        /// Append a raw byte operand (argument counts, push bytes).
        pub fn byte(&mut self, value: u8) -> &mut Self {
            self.items.push(Item::Byte(value));
            self
        }

        /// Append a literal-index operand.
        pub fn lit(&mut self, lit: Lit) -> &mut Self {
            self.items.push(Item::Lit(lit));
            self
        }

        /// Fresh unbound label.
        pub fn label(&mut self) -> Label {
            self.labels.push(None);
            Label(self.labels.len() - 1)
        }

        /// Bind a label to the current position.
        pub fn bind(&mut self, label: Label) -> &mut Self {
            debug_assert!(self.labels[label.0].is_none(), "label bound twice");
            self.labels[label.0] = Some(self.items.len());
            self
        }

        /// Emit a branch opcode targeting `label`.
        pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
            let meta = opcode.meta();
            debug_assert!(meta.branch_length > 0, "{opcode:?} is not a branch");
            self.items.push(Item::Branch {
                prefix: None,
                opcode: opcode as u8,
                length: meta.branch_length,
                backward: meta.backward_branch,
                label,
            });
            self
        }

        /// Emit an extended branch opcode targeting `label`.
        pub fn ext_branch(&mut self, ext: ExtOpcode, label: Label) -> &mut Self {
            let meta = ext.meta();
            debug_assert!(meta.branch_length > 0, "{ext:?} is not a branch");
            self.items.push(Item::Branch {
                prefix: Some(Opcode::ExtPrefix as u8),
                opcode: ext as u8,
                length: meta.branch_length,
                backward: meta.backward_branch,
                label,
            });
            self
        }

        /// Assemble the unit.
        ///
        /// # Panics
        ///
        /// Panics on unbound labels or if the literal table outgrows the
        /// one-byte index window; tests stay far below it.
        pub fn build(&mut self) -> Rc<CompiledCode> {
            let register_end = self.register_end();
            let ident_end = register_end + self.idents.len() as u16;
            let const_literal_end = ident_end + self.consts.len() as u16;
            let literal_end = const_literal_end + self.objects.len() as u16;
            assert!(
                literal_end < crate::consts::SMALL_LITERAL_ENCODING_LIMIT,
                "literal table exceeds the narrow encoding"
            );

            // First pass: item positions in bytes. Branch sites and
            // literal operands have fixed widths (2-byte branch offsets
            // come from the opcode table, literal indices stay narrow).
            let mut positions = Vec::with_capacity(self.items.len());
            let mut position = 0usize;
            for item in &self.items {
                positions.push(position);
                position += match item {
                    Item::Byte(_) | Item::Lit(_) => 1,
                    Item::Branch { prefix, length, .. } => {
                        usize::from(prefix.is_some()) + 1 + *length as usize
                    }
                };
            }
            positions.push(position);

            let resolve_label = |label: &Label| -> usize {
                let item_index = self.labels[label.0].expect("unbound branch label");
                positions[item_index]
            };

            let mut bytecode = Vec::with_capacity(position);
            for (index, item) in self.items.iter().enumerate() {
                match item {
                    Item::Byte(byte) => bytecode.push(*byte),
                    Item::Lit(lit) => {
                        let resolved = match lit.kind {
                            LitKind::Register => lit.index,
                            LitKind::Ident => register_end as usize + lit.index,
                            LitKind::Const => ident_end as usize + lit.index,
                            LitKind::Object => const_literal_end as usize + lit.index,
                        };
                        bytecode.push(resolved as u8);
                    }
                    Item::Branch {
                        prefix,
                        opcode,
                        length,
                        backward,
                        label,
                    } => {
                        let instr_start = positions[index];
                        let target = resolve_label(label);
                        let offset = if *backward {
                            assert!(target <= instr_start, "backward branch to a later label");
                            instr_start - target
                        } else {
                            assert!(target >= instr_start, "forward branch to an earlier label");
                            target - instr_start
                        };
                        if let Some(prefix) = prefix {
                            bytecode.push(*prefix);
                        }
                        bytecode.push(*opcode);
                        match length {
                            1 => bytecode.push(offset as u8),
                            2 => {
                                bytecode.push((offset >> 8) as u8);
                                bytecode.push(offset as u8);
                            }
                            _ => {
                                bytecode.push((offset >> 16) as u8);
                                bytecode.push((offset >> 8) as u8);
                                bytecode.push(offset as u8);
                            }
                        }
                    }
                }
            }

            let mut literals =
                Vec::with_capacity(self.idents.len() + self.consts.len() + self.objects.len());
            literals.extend(self.idents.iter().cloned().map(Literal::Ident));
            literals.extend(self.consts.iter().cloned());
            literals.extend(self.objects.iter().cloned());

            Rc::new(CompiledCode {
                flags: self.flags,
                argument_end: self.argument_end,
                register_end,
                ident_end,
                const_literal_end,
                literal_end,
                stack_limit: self.stack_limit,
                literals,
                bytecode,
            })
        }
    }
}
