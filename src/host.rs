//! Host hook surface
//!
//! The interpreter is parameterized over a [`Host`] the same way it would
//! be over a storage backend: the default unit host does nothing, embedders
//! override the hooks they care about.

/// Answer of the periodic stop-hook consulted at backward branches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecStop {
    /// Keep running; the counter refills.
    #[default]
    Continue,
    /// Abort execution. The message becomes the raised value and the
    /// abort flag bypasses every `catch` on the way out.
    Abort(Box<str>),
}

/// Debugger verdict for a breakpoint hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugAction {
    /// Resume execution.
    #[default]
    Continue,
    /// Abort the running code.
    Stop,
}

/// Embedder-provided hooks.
///
/// Every method has a neutral default, so `()` is a complete host.
pub trait Host {
    /// Consulted when the backward-branch counter expires. Only called
    /// when the `vm-exec-stop` feature is enabled.
    fn exec_stop(&mut self) -> ExecStop {
        ExecStop::Continue
    }

    /// Runs module initialization before module code is dispatched. Only
    /// called when the `module-system` feature is enabled.
    fn module_initialize(&mut self) -> Result<(), Box<str>> {
        Ok(())
    }

    /// A breakpoint opcode was hit at the given bytecode offset. Only
    /// called when the `debug` feature is enabled.
    fn breakpoint_hit(&mut self, offset: usize) -> DebugAction {
        let _ = offset;
        DebugAction::Continue
    }

    /// An exception started unwinding. Only called when the `debug`
    /// feature is enabled.
    fn exception_thrown(&mut self) {}
}

impl Host for () {}
