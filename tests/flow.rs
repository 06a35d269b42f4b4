use kestrel_vm::prelude::*;

/// function f(x) { return x * x } f(11) through the multiply fast path.
#[test]
fn simple_function_call() {
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION);
    f.arguments(1);
    let x = f.register(0);
    f.op(Opcode::MulTwoLiterals).lit(x).lit(x);
    f.op(Opcode::Return);
    let square = f.build();

    let mut b = CodeBuilder::new();
    let square_lit = b.function(square);
    let eleven = b.integer(11);
    b.op(Opcode::PushLiteral).lit(square_lit);
    b.op(Opcode::PushLiteral).lit(eleven);
    b.op(Opcode::CallPush).byte(1);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("call runs");
    assert!(result.is_integer());
    assert_eq!(result.as_integer(), 121);
}

/// ((x) => x + 1)(41): the arrow captures the creating frame's this.
#[test]
fn arrow_function_call() {
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION | CodeFlags::ARROW);
    f.arguments(1);
    let x = f.register(0);
    let one = f.integer(1);
    f.op(Opcode::AddTwoLiterals).lit(x).lit(one);
    f.op(Opcode::Return);
    let arrow = f.build();

    let mut b = CodeBuilder::new();
    let arrow_lit = b.function(arrow);
    let n = b.integer(41);
    b.op(Opcode::PushLiteral).lit(arrow_lit);
    b.op(Opcode::PushLiteral).lit(n);
    b.op(Opcode::CallPush).byte(1);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("arrow runs");
    assert_eq!(result.as_integer(), 42);
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let mut b = CodeBuilder::new();
    let n = b.integer(3);
    b.op(Opcode::PushLiteral).lit(n);
    b.op(Opcode::CallPush).byte(0);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let error = vm.run_global(b.build()).expect_err("number is not callable");
    match error {
        EngineError::Uncaught { kind, .. } => assert_eq!(kind, ExceptionKind::TypeError),
        other => panic!("unexpected error {other:?}"),
    }
}

/// Nested user calls re-enter the driver iteratively: f calls g, g calls
/// h, results flow back through each frame.
#[test]
fn nested_call_chain() {
    let mut h = CodeBuilder::new();
    h.flags(CodeFlags::FUNCTION);
    h.arguments(1);
    let n = h.register(0);
    let one = h.integer(1);
    h.op(Opcode::AddTwoLiterals).lit(n).lit(one);
    h.op(Opcode::Return);
    let h_code = h.build();

    let mut g = CodeBuilder::new();
    g.flags(CodeFlags::FUNCTION);
    g.arguments(1);
    let n = g.register(0);
    let h_lit = g.function(h_code);
    let two = g.integer(2);
    g.op(Opcode::PushLiteral).lit(h_lit);
    g.op(Opcode::AddTwoLiterals).lit(n).lit(two);
    g.op(Opcode::CallPush).byte(1);
    g.op(Opcode::Return);
    let g_code = g.build();

    let mut b = CodeBuilder::new();
    let g_lit = b.function(g_code);
    let ten = b.integer(10);
    b.op(Opcode::PushLiteral).lit(g_lit);
    b.op(Opcode::PushLiteral).lit(ten);
    b.op(Opcode::CallPush).byte(1);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("chain runs");
    assert_eq!(result.as_integer(), 13);
}

/// new F() builds an instance wired to F.prototype; an explicit object
/// return from the constructor would win instead.
#[test]
fn construct_builds_an_instance() {
    // function Point() { this.x = 9 }
    let mut ctor = CodeBuilder::new();
    ctor.flags(CodeFlags::FUNCTION);
    let x_name = ctor.string("x");
    let nine = ctor.integer(9);
    ctor.op(Opcode::PushThis);
    ctor.op(Opcode::PushLiteral).lit(x_name);
    ctor.op(Opcode::PushLiteral).lit(nine);
    ctor.op(Opcode::Assign);
    ctor.op(Opcode::PushUndefined);
    ctor.op(Opcode::Return);
    let ctor_code = ctor.build();

    let mut b = CodeBuilder::new();
    let ctor_lit = b.function(ctor_code);
    b.op(Opcode::PushLiteral).lit(ctor_lit);
    b.op(Opcode::New).byte(0);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let instance = vm.run_global(b.build()).expect("construction runs");
    assert!(instance.is_object());

    // this.x landed on the instance.
    let reads = {
        let mut r = CodeBuilder::new();
        let p = r.ident("p");
        let x = r.string("x");
        r.op(Opcode::PropGetTwoLiterals).lit(p).lit(x);
        r.op(Opcode::Return);
        r.build()
    };
    vm.set_global("p", instance);
    let result = vm.run_global(reads).expect("read runs");
    assert_eq!(result.as_integer(), 9);
}

/// new.target reflects the invoked constructor and is undefined in plain
/// calls.
#[test]
fn new_target_tracks_construct_invocations() {
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION);
    f.ext(ExtOpcode::PushNewTarget);
    f.op(Opcode::Return);
    let code = f.build();

    let mut b = CodeBuilder::new();
    let f_lit = b.function(code.clone());
    b.op(Opcode::PushLiteral).lit(f_lit);
    b.op(Opcode::New).byte(0);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let constructed = vm.run_global(b.build()).expect("construct runs");
    assert!(constructed.is_object());
    vm.free_value(constructed);

    let mut b = CodeBuilder::new();
    let f_lit = b.function(code);
    b.op(Opcode::PushLiteral).lit(f_lit);
    b.op(Opcode::CallPush).byte(0);
    b.op(Opcode::Return);
    let called = vm.run_global(b.build()).expect("call runs");
    assert!(called.is_undefined());
}

/// Spread call: sum(...[20, 22]).
#[test]
fn spread_call_expands_an_array() {
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION);
    f.arguments(2);
    let a = f.register(0);
    let bq = f.register(1);
    f.op(Opcode::AddTwoLiterals).lit(a).lit(bq);
    f.op(Opcode::Return);
    let sum = f.build();

    let mut b = CodeBuilder::new();
    let sum_lit = b.function(sum);
    let twenty = b.integer(20);
    let twenty_two = b.integer(22);

    b.op(Opcode::PushLiteral).lit(sum_lit);
    b.ext(ExtOpcode::PushSpreadElement);
    b.op(Opcode::PushArray);
    b.op(Opcode::PushLiteral).lit(twenty);
    b.op(Opcode::PushLiteral).lit(twenty_two);
    b.op(Opcode::AppendArray).byte(2);
    b.ext(ExtOpcode::SpreadCallPush).byte(2);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("spread call runs");
    assert_eq!(result.as_integer(), 42);
}

/// Rest parameter collects surplus arguments into a fresh array.
#[test]
fn rest_parameter_collects_surplus_arguments() {
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION | CodeFlags::REST_PARAMETER);
    f.arguments(1);
    let rest = f.register(1);
    f.op(Opcode::ReturnWithLiteral).lit(rest);
    let code = f.build();

    let mut b = CodeBuilder::new();
    let f_lit = b.function(code);
    let one = b.integer(1);
    let two = b.integer(2);
    let three = b.integer(3);
    b.op(Opcode::PushLiteral).lit(f_lit);
    b.op(Opcode::PushLiteral).lit(one);
    b.op(Opcode::PushLiteral).lit(two);
    b.op(Opcode::PushLiteral).lit(three);
    b.op(Opcode::CallPush).byte(3);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let rest = vm.run_global(b.build()).expect("rest call runs");
    let elements: Vec<i32> = vm
        .heap()
        .array_elements(rest)
        .expect("rest is an array")
        .iter()
        .map(|value| value.as_integer())
        .collect();
    assert_eq!(elements, vec![2, 3]);
    vm.free_value(rest);
}

/// Generator: three resumptions yield 1, 2 and finish with 3.
#[test]
fn generator_yields_and_completes() {
    let mut g = CodeBuilder::new();
    g.flags(CodeFlags::FUNCTION | CodeFlags::GENERATOR);
    let one = g.integer(1);
    let two = g.integer(2);
    let three = g.integer(3);
    g.ext(ExtOpcode::CreateGenerator);
    g.op(Opcode::Pop);
    g.op(Opcode::PushLiteral).lit(one);
    g.ext(ExtOpcode::Yield);
    g.op(Opcode::Pop);
    g.op(Opcode::PushLiteral).lit(two);
    g.ext(ExtOpcode::Yield);
    g.op(Opcode::Pop);
    g.op(Opcode::PushLiteral).lit(three);
    g.op(Opcode::Return);
    let code = g.build();

    let mut b = CodeBuilder::new();
    let g_lit = b.function(code);
    b.op(Opcode::PushLiteral).lit(g_lit);
    b.op(Opcode::CallPush).byte(0);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let generator = vm.run_global(b.build()).expect("generator created");
    assert!(generator.is_object());

    let first = vm.resume(generator, Value::UNDEFINED).expect("first step");
    assert_eq!(first, GeneratorStep::Yielded(Value::from_integer(1)));
    let second = vm.resume(generator, Value::UNDEFINED).expect("second step");
    assert_eq!(second, GeneratorStep::Yielded(Value::from_integer(2)));
    let third = vm.resume(generator, Value::UNDEFINED).expect("third step");
    assert_eq!(third, GeneratorStep::Done(Value::from_integer(3)));

    // Exhausted generators stay done.
    let fourth = vm.resume(generator, Value::UNDEFINED).expect("fourth step");
    assert!(fourth.is_done());
    vm.free_value(generator);
}

/// The sent value becomes the result of the suspended yield expression.
#[test]
fn generator_receives_sent_values() {
    let mut g = CodeBuilder::new();
    g.flags(CodeFlags::FUNCTION | CodeFlags::GENERATOR);
    let zero = g.integer(0);
    g.ext(ExtOpcode::CreateGenerator);
    g.op(Opcode::Pop);
    g.op(Opcode::PushLiteral).lit(zero);
    g.ext(ExtOpcode::Yield);
    // The sent value is on the stack now; return it doubled.
    g.op(Opcode::PushZero);
    g.op(Opcode::Add);
    g.op(Opcode::Return);
    let code = g.build();

    let mut b = CodeBuilder::new();
    let g_lit = b.function(code);
    b.op(Opcode::PushLiteral).lit(g_lit);
    b.op(Opcode::CallPush).byte(0);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let generator = vm.run_global(b.build()).expect("generator created");
    let _ = vm.resume(generator, Value::UNDEFINED).expect("starts");
    let done = vm
        .resume(generator, Value::from_integer(21))
        .expect("finishes");
    assert_eq!(done, GeneratorStep::Done(Value::from_integer(21)));
    vm.free_value(generator);
}

fn class_pair(vm: &mut Interpreter) -> (Value, Value) {
    // class Base {}  (implicit constructor)
    let mut b = CodeBuilder::new();
    let base_name = b.ident("Base");
    b.op(Opcode::PushUndefined);
    b.ext(ExtOpcode::PushImplicitConstructor);
    b.ext(ExtOpcode::InitClass);
    b.ext(ExtOpcode::FinalizeClass);
    b.op(Opcode::AssignIdent).lit(base_name);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);
    let program = b.build();
    let result = vm.run_global(program).expect("Base defined");
    vm.free_value(result);

    // class Derived extends Base { constructor() { super() } }
    let mut ctor = CodeBuilder::new();
    ctor.flags(
        CodeFlags::FUNCTION | CodeFlags::CLASS_CONSTRUCTOR | CodeFlags::DERIVED_CONSTRUCTOR,
    );
    ctor.ext(ExtOpcode::PushSuperConstructor);
    ctor.ext(ExtOpcode::SuperCall).byte(0);
    ctor.op(Opcode::ReturnWithBlock);
    let ctor_code = ctor.build();

    let mut b = CodeBuilder::new();
    let base_name = b.ident("Base");
    let derived_name = b.ident("Derived");
    let ctor_lit = b.function(ctor_code);
    b.op(Opcode::PushLiteral).lit(base_name);
    b.op(Opcode::PushLiteral).lit(ctor_lit);
    b.ext(ExtOpcode::InitClass);
    b.ext(ExtOpcode::FinalizeClass);
    b.op(Opcode::AssignIdent).lit(derived_name);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);
    let program = b.build();
    let result = vm.run_global(program).expect("Derived defined");
    vm.free_value(result);

    let base = vm.global_get("Base");
    let derived = vm.global_get("Derived");
    (base, derived)
}

/// super() constructs the parent, binds this, and wires the instance to
/// the derived prototype.
#[test]
fn derived_class_construction_through_super() {
    let mut vm = Interpreter::new();
    let (base, derived) = class_pair(&mut vm);
    assert!(vm.heap().is_callable(base));
    assert!(vm.heap().is_callable(derived));

    let mut b = CodeBuilder::new();
    let derived_name = b.ident("Derived");
    b.op(Opcode::PushLiteral).lit(derived_name);
    b.op(Opcode::New).byte(0);
    b.op(Opcode::Return);

    let instance = vm.run_global(b.build()).expect("new Derived() runs");
    assert!(instance.is_object());

    // instance instanceof Derived, through the wired prototype chain.
    let mut b = CodeBuilder::new();
    let p = b.ident("p");
    let derived_name = b.ident("Derived");
    b.op(Opcode::PushLiteral).lit(p);
    b.op(Opcode::PushLiteral).lit(derived_name);
    b.op(Opcode::InstanceOf);
    b.op(Opcode::Return);
    vm.set_global("p", instance);
    let verdict = vm.run_global(b.build()).expect("instanceof runs");
    assert!(verdict.is_true());

    vm.free_value(base);
    vm.free_value(derived);
}

/// Calling super twice raises ReferenceError.
#[test]
fn double_super_call_is_a_reference_error() {
    let mut vm = Interpreter::new();
    let (base, derived) = class_pair(&mut vm);
    vm.free_value(base);
    vm.free_value(derived);

    let mut ctor = CodeBuilder::new();
    ctor.flags(
        CodeFlags::FUNCTION | CodeFlags::CLASS_CONSTRUCTOR | CodeFlags::DERIVED_CONSTRUCTOR,
    );
    ctor.ext(ExtOpcode::PushSuperConstructor);
    ctor.ext(ExtOpcode::SuperCall).byte(0);
    ctor.ext(ExtOpcode::PushSuperConstructor);
    ctor.ext(ExtOpcode::SuperCall).byte(0);
    ctor.op(Opcode::ReturnWithBlock);
    let ctor_code = ctor.build();

    let mut b = CodeBuilder::new();
    let base_name = b.ident("Base");
    let twice_name = b.ident("Twice");
    let ctor_lit = b.function(ctor_code);
    b.op(Opcode::PushLiteral).lit(base_name);
    b.op(Opcode::PushLiteral).lit(ctor_lit);
    b.ext(ExtOpcode::InitClass);
    b.ext(ExtOpcode::FinalizeClass);
    b.op(Opcode::AssignIdent).lit(twice_name);
    b.op(Opcode::PushLiteral).lit(twice_name);
    b.op(Opcode::New).byte(0);
    b.op(Opcode::Return);

    let error = vm.run_global(b.build()).expect_err("second super throws");
    match error {
        EngineError::Uncaught { kind, .. } => assert_eq!(kind, ExceptionKind::ReferenceError),
        other => panic!("unexpected error {other:?}"),
    }
}

/// Class constructors reject plain calls.
#[test]
fn class_constructor_requires_new() {
    let mut vm = Interpreter::new();
    let (base, derived) = class_pair(&mut vm);
    vm.free_value(base);
    vm.free_value(derived);

    let mut b = CodeBuilder::new();
    let derived_name = b.ident("Derived");
    b.op(Opcode::PushLiteral).lit(derived_name);
    b.op(Opcode::CallPush).byte(0);
    b.op(Opcode::Return);

    let error = vm.run_global(b.build()).expect_err("plain call rejected");
    match error {
        EngineError::Uncaught { kind, .. } => assert_eq!(kind, ExceptionKind::TypeError),
        other => panic!("unexpected error {other:?}"),
    }
}

/// Closures keep their environment alive past the creating frame.
#[test]
fn closures_capture_their_environment() {
    // function make() { let n = 41; return function () { n = n + 1; return n } }
    let mut inner = CodeBuilder::new();
    inner.flags(CodeFlags::FUNCTION);
    let n = inner.ident("n");
    let one = inner.integer(1);
    inner.op(Opcode::PushLiteral).lit(n);
    inner.op(Opcode::PushLiteral).lit(one);
    inner.op(Opcode::Add);
    inner.op(Opcode::AssignIdentPush).lit(n);
    inner.op(Opcode::Return);
    let inner_code = inner.build();

    let mut outer = CodeBuilder::new();
    outer.flags(CodeFlags::FUNCTION);
    let n = outer.ident("n");
    let fortyone = outer.integer(41);
    let inner_lit = outer.function(inner_code);
    outer.op(Opcode::CreateLet).lit(n);
    outer.op(Opcode::PushLiteral).lit(fortyone);
    outer.op(Opcode::AssignLetConst).lit(n);
    outer.op(Opcode::PushLiteral).lit(inner_lit);
    outer.op(Opcode::Return);
    let outer_code = outer.build();

    let mut b = CodeBuilder::new();
    let make_lit = b.function(outer_code);
    b.op(Opcode::PushLiteral).lit(make_lit);
    b.op(Opcode::CallPush).byte(0);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let counter = vm.run_global(b.build()).expect("factory runs");
    assert!(vm.heap().is_callable(counter));

    let first = vm
        .invoke(counter, Value::UNDEFINED, &[])
        .expect("first call");
    let second = vm
        .invoke(counter, Value::UNDEFINED, &[])
        .expect("second call");
    assert_eq!(first.as_integer(), 42);
    assert_eq!(second.as_integer(), 43);
    vm.free_value(counter);
}

/// A named function expression sees itself through its own name binding.
#[test]
fn named_function_expression_binds_its_own_name() {
    // (function fact(n) { return n < 2 ? 1 : n * fact(n - 1) })(5)
    let mut f = CodeBuilder::new();
    f.flags(CodeFlags::FUNCTION);
    f.arguments(1);
    let n = f.register(0);
    let fact = f.ident("fact");
    let one = f.integer(1);
    let two = f.integer(2);

    let recurse = f.label();
    f.op(Opcode::LessTwoLiterals).lit(n).lit(two);
    f.branch(Opcode::BranchIfFalseForward2, recurse);
    f.op(Opcode::ReturnWithLiteral).lit(one);
    f.bind(recurse);
    f.op(Opcode::PushLiteral).lit(n);
    f.op(Opcode::PushLiteral).lit(fact);
    f.op(Opcode::SubTwoLiterals).lit(n).lit(one);
    f.op(Opcode::CallPush).byte(1);
    f.op(Opcode::Mul);
    f.op(Opcode::Return);
    let fact_code = f.build();

    let mut b = CodeBuilder::new();
    let fact_lit = b.function(fact_code);
    let name = b.string("fact");
    let five = b.integer(5);
    b.op(Opcode::PushNamedFuncExpr).lit(fact_lit).lit(name);
    b.op(Opcode::PushLiteral).lit(five);
    b.op(Opcode::CallPush).byte(1);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("recursion runs");
    assert_eq!(result.as_integer(), 120);
}
