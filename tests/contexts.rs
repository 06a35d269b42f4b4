use kestrel_vm::prelude::*;

/// try { throw 'boom' } catch (e) { e } with the caught value stored into
/// a register and returned.
#[test]
fn throw_is_caught_and_bound() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let e = b.register(0);
    let boom = b.string("boom");

    let handler = b.label();
    let catch_end = b.label();
    b.branch(Opcode::Try, handler);
    b.op(Opcode::PushLiteral).lit(boom);
    b.op(Opcode::Throw);
    b.bind(handler);
    b.branch(Opcode::Catch, catch_end);
    // The unwinder pushes the exception for the catch body.
    b.op(Opcode::AssignIdent).lit(e);
    b.bind(catch_end);
    b.op(Opcode::ContextEnd);
    b.op(Opcode::ReturnWithLiteral).lit(e);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("catch handles the throw");
    assert!(result.is_string());
    assert_eq!(&*vm.heap().string_of(result), "boom");
    vm.free_value(result);
}

/// Three nested try/finally regions; the innermost finally returns 7
/// while the innermost try throws. The return wins, every finally on the
/// way out still runs, and no exception is left pending.
#[test]
fn return_through_nested_finally_blocks() {
    let mut b = CodeBuilder::new();
    let seven = b.integer(7);
    let kaboom = b.string("x");

    let outer_handler = b.label();
    let outer_end = b.label();
    let middle_handler = b.label();
    let middle_end = b.label();
    let inner_handler = b.label();
    let inner_end = b.label();

    b.branch(Opcode::Try, outer_handler);
    b.branch(Opcode::Try, middle_handler);
    b.branch(Opcode::Try, inner_handler);
    b.op(Opcode::PushLiteral).lit(kaboom);
    b.op(Opcode::Throw);

    b.bind(inner_handler);
    b.branch(Opcode::Finally, inner_end);
    b.op(Opcode::PushLiteral).lit(seven);
    b.op(Opcode::Return);
    b.op(Opcode::ContextEnd);
    b.bind(inner_end);
    b.op(Opcode::ContextEnd);

    b.bind(middle_handler);
    b.branch(Opcode::Finally, middle_end);
    b.op(Opcode::ContextEnd);
    b.bind(middle_end);
    b.op(Opcode::ContextEnd);

    b.bind(outer_handler);
    b.branch(Opcode::Finally, outer_end);
    b.op(Opcode::ContextEnd);
    b.bind(outer_end);
    b.op(Opcode::ContextEnd);

    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("no pending exception");
    assert_eq!(result.as_integer(), 7);
}

/// A finally without a catch runs and re-raises the original exception.
#[test]
fn finally_rethrows_when_no_catch_exists() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let witness = b.register(0);
    let one = b.integer(1);
    let kaboom = b.string("kaboom");

    let handler = b.label();
    let end = b.label();
    b.branch(Opcode::Try, handler);
    b.op(Opcode::PushLiteral).lit(kaboom);
    b.op(Opcode::Throw);
    b.bind(handler);
    b.branch(Opcode::Finally, end);
    b.op(Opcode::AssignLiteralIdent).lit(one).lit(witness);
    b.op(Opcode::ContextEnd);
    b.bind(end);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let error = vm.run_global(b.build()).expect_err("the throw escapes");
    match error {
        EngineError::Uncaught { kind, message } => {
            assert_eq!(kind, ExceptionKind::Error);
            assert_eq!(&*message, "kaboom");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

/// Normal and throwing exits leave the context stack at the same depth;
/// running both on one interpreter would corrupt the shared heap
/// otherwise.
#[test]
fn all_exit_paths_balance_the_context_stack() {
    let mut vm = Interpreter::new();

    for throw in [false, true] {
        let mut b = CodeBuilder::new();
        let seven = b.integer(7);
        let kaboom = b.string("x");

        let handler = b.label();
        let catch_end = b.label();
        b.branch(Opcode::Try, handler);
        if throw {
            b.op(Opcode::PushLiteral).lit(kaboom);
            b.op(Opcode::Throw);
        }
        b.bind(handler);
        b.branch(Opcode::Catch, catch_end);
        b.op(Opcode::Pop);
        b.bind(catch_end);
        b.op(Opcode::ContextEnd);
        b.op(Opcode::PushLiteral).lit(seven);
        b.op(Opcode::Return);

        let result = vm.run_global(b.build()).expect("balanced exit");
        assert_eq!(result.as_integer(), 7);
    }
}

/// break out of a try/finally: the jump is intercepted, the finally runs,
/// and execution continues at the jump target.
#[test]
fn jump_and_exit_context_runs_finally_first() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let acc = b.register(0);
    let zero = b.integer(0);
    let ten = b.integer(10);
    let one = b.integer(1);

    let handler = b.label();
    let after = b.label();

    b.op(Opcode::AssignLiteralIdent).lit(zero).lit(acc);
    b.branch(Opcode::Try, handler);
    b.branch(Opcode::JumpAndExitContext, after);
    b.bind(handler);
    b.branch(Opcode::Finally, after);
    b.op(Opcode::AddTwoLiterals).lit(acc).lit(ten);
    b.op(Opcode::AssignIdent).lit(acc);
    b.op(Opcode::ContextEnd);
    b.bind(after);
    b.op(Opcode::AddTwoLiterals).lit(acc).lit(one);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("break unwinds cleanly");
    assert_eq!(result.as_integer(), 11);
}

/// let: reading before initialization raises ReferenceError; the
/// UNINITIALIZED sentinel is never observable.
#[test]
fn let_read_before_initialization_is_a_reference_error() {
    let mut b = CodeBuilder::new();
    let name = b.ident("tdz");
    b.op(Opcode::CreateLet).lit(name);
    b.op(Opcode::PushLiteral).lit(name);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let error = vm.run_global(b.build()).expect_err("TDZ read throws");
    match error {
        EngineError::Uncaught { kind, .. } => assert_eq!(kind, ExceptionKind::ReferenceError),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn const_reassignment_is_a_type_error() {
    let mut b = CodeBuilder::new();
    let name = b.ident("frozen");
    let one = b.integer(1);
    let two = b.integer(2);
    b.op(Opcode::CreateConst).lit(name);
    b.op(Opcode::PushLiteral).lit(one);
    b.op(Opcode::AssignLetConst).lit(name);
    b.op(Opcode::AssignLiteralIdent).lit(two).lit(name);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let error = vm.run_global(b.build()).expect_err("const write throws");
    match error {
        EngineError::Uncaught { kind, .. } => assert_eq!(kind, ExceptionKind::TypeError),
        other => panic!("unexpected error {other:?}"),
    }
}

/// with(o) resolves identifiers through the bound object and supplies the
/// implicit this for ident-based calls.
#[test]
fn with_statement_binds_scope_and_implicit_this() {
    // Method body: return this.x
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION);
    let x = f.string("x");
    f.op(Opcode::PropGetThisLiteral).lit(x);
    f.op(Opcode::Return);
    let method = f.build();

    // o = { x: 7, m: <method> }; with (o) { result = m() }
    let mut b = CodeBuilder::new();
    let o = b.ident("o");
    let m = b.ident("m");
    let result_name = b.ident("result");
    let x_name = b.string("x");
    let m_name = b.string("m");
    let seven = b.integer(7);
    let method_lit = b.function(method);

    b.op(Opcode::PushObject);
    b.op(Opcode::PushLiteral).lit(seven);
    b.op(Opcode::SetProperty).lit(x_name);
    b.op(Opcode::PushLiteral).lit(method_lit);
    b.op(Opcode::SetProperty).lit(m_name);
    b.op(Opcode::AssignIdent).lit(o);

    let with_end = b.label();
    b.op(Opcode::PushLiteral).lit(o);
    b.branch(Opcode::With, with_end);
    b.op(Opcode::IdentReference).lit(m);
    b.op(Opcode::ResolveBaseForCall);
    b.op(Opcode::CallPropPush).byte(0);
    b.op(Opcode::AssignIdent).lit(result_name);
    b.op(Opcode::ContextEnd);
    b.bind(with_end);
    b.op(Opcode::PushLiteral).lit(result_name);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("with call runs");
    assert_eq!(result.as_integer(), 7);
}

/// The tested value survives on the stack when a logical branch is taken.
#[test]
fn logical_branches_keep_the_tested_value() {
    // "" || "fallback"
    let mut b = CodeBuilder::new();
    let empty = b.string("");
    let fallback = b.string("fallback");
    let done = b.label();
    b.op(Opcode::PushLiteral).lit(empty);
    b.branch(Opcode::BranchIfLogicalTrue2, done);
    b.op(Opcode::PushLiteral).lit(fallback);
    b.bind(done);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("short circuit runs");
    assert_eq!(&*vm.heap().string_of(result), "fallback");
    vm.free_value(result);

    // "kept" || "fallback"
    let mut b = CodeBuilder::new();
    let kept = b.string("kept");
    let fallback = b.string("fallback");
    let done = b.label();
    b.op(Opcode::PushLiteral).lit(kept);
    b.branch(Opcode::BranchIfLogicalTrue2, done);
    b.op(Opcode::PushLiteral).lit(fallback);
    b.bind(done);
    b.op(Opcode::Return);

    let result = vm.run_global(b.build()).expect("short circuit keeps value");
    assert_eq!(&*vm.heap().string_of(result), "kept");
    vm.free_value(result);
}

/// Switch dispatch: BranchIfStrictEqual consumes the scrutinee only on a
/// match and keeps it for later cases otherwise.
#[test]
fn strict_equal_branches_drive_switch_dispatch() {
    let mut b = CodeBuilder::new();
    let two = b.integer(2);
    let one = b.integer(1);
    let first = b.integer(10);
    let second = b.integer(20);

    let case_one = b.label();
    let case_two = b.label();
    b.op(Opcode::PushLiteral).lit(two);
    b.op(Opcode::PushLiteral).lit(one);
    b.branch(Opcode::BranchIfStrictEqual2, case_one);
    b.op(Opcode::PushLiteral).lit(two);
    b.branch(Opcode::BranchIfStrictEqual2, case_two);
    b.op(Opcode::Pop);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);
    b.bind(case_one);
    b.op(Opcode::PushLiteral).lit(first);
    b.op(Opcode::Return);
    b.bind(case_two);
    b.op(Opcode::PushLiteral).lit(second);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("switch runs");
    assert_eq!(result.as_integer(), 20);
}
