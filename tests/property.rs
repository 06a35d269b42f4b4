use kestrel_vm::prelude::*;

/// set then get round-trips through a plain object.
#[test]
fn set_then_get_round_trips() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let obj = b.register(0);
    let key = b.string("answer");
    let value = b.integer(42);

    b.op(Opcode::PushObject);
    b.op(Opcode::MovIdent).lit(obj);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(value);
    b.op(Opcode::Assign);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(key);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("round trip runs");
    assert_eq!(result.as_integer(), 42);
}

/// Repeated reads of the same property hit the lookup cache; mutation
/// through delete + redefine invalidates it.
#[test]
fn repeated_reads_survive_shape_changes() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let obj = b.register(0);
    let key = b.string("k");
    let one = b.integer(1);
    let two = b.integer(2);

    b.op(Opcode::PushObject);
    b.op(Opcode::MovIdent).lit(obj);
    // obj.k = 1; read twice; delete obj.k; obj.k = 2; read again.
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(one);
    b.op(Opcode::Assign);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(key);
    b.op(Opcode::Pop);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(key);
    b.op(Opcode::Pop);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PropDelete);
    b.op(Opcode::Pop);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(two);
    b.op(Opcode::Assign);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(key);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("cache stays coherent");
    assert_eq!(result.as_integer(), 2);
}

/// Array literal reads go through the dense fast path; indices past the
/// length and holes fall through to the full lookup.
#[test]
fn fast_array_reads_and_holes() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let arr = b.register(0);
    let ten = b.integer(10);
    let twenty = b.integer(20);
    let idx1 = b.integer(1);
    let idx5 = b.integer(5);
    let idx0 = b.integer(0);

    b.op(Opcode::PushArray);
    b.op(Opcode::PushLiteral).lit(ten);
    b.op(Opcode::PushElision);
    b.op(Opcode::PushLiteral).lit(twenty);
    b.op(Opcode::AppendArray).byte(3);
    b.op(Opcode::MovIdent).lit(arr);

    // [10, <hole>, 20]: arr[2] would be 20; check in-range, hole and
    // out-of-range reads.
    b.op(Opcode::PushArray);
    b.op(Opcode::PropGetTwoLiterals).lit(arr).lit(idx0);
    b.op(Opcode::PropGetTwoLiterals).lit(arr).lit(idx1);
    b.op(Opcode::PropGetTwoLiterals).lit(arr).lit(idx5);
    b.op(Opcode::AppendArray).byte(3);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("array reads run");
    let elements = vm.heap().array_elements(result).expect("array result");
    assert_eq!(elements[0].as_integer(), 10);
    assert!(elements[1].is_undefined());
    assert!(elements[2].is_undefined());
    vm.free_value(result);
}

/// Reading a member of null names both sides in the TypeError.
#[test]
fn null_base_read_raises_a_descriptive_type_error() {
    let mut b = CodeBuilder::new();
    let key = b.string("length");
    b.op(Opcode::PushNull);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PropGet);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let error = vm.run_global(b.build()).expect_err("null base throws");
    match error {
        EngineError::Uncaught { kind, message } => {
            assert_eq!(kind, ExceptionKind::TypeError);
            #[cfg(feature = "error-messages")]
            assert_eq!(&*message, "Cannot read property 'length' of null");
            let _ = message;
        }
        other => panic!("unexpected error {other:?}"),
    }
}

/// delete removes configurable properties and reports the outcome.
#[test]
fn delete_returns_a_boolean() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let obj = b.register(0);
    let key = b.string("gone");
    let one = b.integer(1);

    b.op(Opcode::PushObject);
    b.op(Opcode::MovIdent).lit(obj);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(one);
    b.op(Opcode::Assign);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PropDelete);
    b.op(Opcode::Pop);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(key);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("delete runs");
    assert!(result.is_undefined());
}

/// Accessor properties: the getter runs on read, the setter on write.
#[test]
fn accessors_dispatch_through_the_property_path() {
    // getter: return 7; setter: this.backing = v
    let mut getter = CodeBuilder::new();
    getter.flags(CodeFlags::FUNCTION);
    let seven = getter.integer(7);
    getter.op(Opcode::ReturnWithLiteral).lit(seven);
    let getter_code = getter.build();

    let mut setter = CodeBuilder::new();
    setter.flags(CodeFlags::FUNCTION);
    setter.arguments(1);
    let v = setter.register(0);
    let backing = setter.string("backing");
    setter.op(Opcode::PushThis);
    setter.op(Opcode::PushLiteral).lit(backing);
    setter.op(Opcode::PushLiteral).lit(v);
    setter.op(Opcode::Assign);
    setter.op(Opcode::ReturnWithBlock);
    let setter_code = setter.build();

    let mut b = CodeBuilder::new();
    b.locals(1);
    let obj = b.register(0);
    let prop = b.string("virtual");
    let backing = b.string("backing");
    let five = b.integer(5);
    let getter_lit = b.function(getter_code);
    let setter_lit = b.function(setter_code);

    b.op(Opcode::PushObject);
    b.op(Opcode::PushLiteral).lit(prop);
    b.op(Opcode::PushLiteral).lit(getter_lit);
    b.op(Opcode::SetGetter);
    b.op(Opcode::PushLiteral).lit(prop);
    b.op(Opcode::PushLiteral).lit(setter_lit);
    b.op(Opcode::SetSetter);
    b.op(Opcode::MovIdent).lit(obj);

    // obj.virtual = 5 runs the setter; obj.virtual + obj.backing = 12.
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(prop);
    b.op(Opcode::PushLiteral).lit(five);
    b.op(Opcode::Assign);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(prop);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(backing);
    b.op(Opcode::Add);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("accessors run");
    assert_eq!(result.as_integer(), 12);
}

fn proxy_counter_setup(vm: &mut Interpreter) {
    // handler.get: return (t.value = (t.value | 0) + 1)
    let mut g = CodeBuilder::new();
    g.flags(CodeFlags::FUNCTION);
    g.arguments(3);
    let target = g.register(0);
    let value_name = g.string("value");
    g.op(Opcode::PushLiteral).lit(target);
    g.op(Opcode::PushPropLiteralReference).lit(value_name);
    g.op(Opcode::PushZero);
    g.op(Opcode::BitOr);
    g.op(Opcode::PushPosByte).byte(0);
    g.op(Opcode::Add);
    g.op(Opcode::AssignPush);
    g.op(Opcode::Return);
    let get_trap = g.build();

    let mut b = CodeBuilder::new();
    let target_name = b.ident("target");
    let handler_name = b.ident("handler");
    let get_name = b.string("get");
    let trap_lit = b.function(get_trap);
    b.op(Opcode::PushObject);
    b.op(Opcode::AssignIdent).lit(target_name);
    b.op(Opcode::PushObject);
    b.op(Opcode::PushLiteral).lit(trap_lit);
    b.op(Opcode::SetProperty).lit(get_name);
    b.op(Opcode::AssignIdent).lit(handler_name);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);

    let result = vm.run_global(b.build()).expect("setup runs");
    vm.free_value(result);

    let target = vm.global_get("target");
    let handler = vm.global_get("handler");
    let proxy = vm.create_proxy(target, handler);
    vm.set_global("p", proxy);
}

/// A proxy get trap observes every read; writes fall through to the
/// target without a set trap, feeding the next trapped read.
#[test]
fn proxy_get_trap_counts_reads() {
    let mut vm = Interpreter::new();
    proxy_counter_setup(&mut vm);

    let mut b = CodeBuilder::new();
    let p = b.ident("p");
    let value_name = b.string("value");
    let fifty_five = b.integer(55);

    b.op(Opcode::PushArray);
    b.op(Opcode::PropGetTwoLiterals).lit(p).lit(value_name);
    b.op(Opcode::PropGetTwoLiterals).lit(p).lit(value_name);
    b.op(Opcode::PropGetTwoLiterals).lit(p).lit(value_name);
    b.op(Opcode::AppendArray).byte(3);
    b.op(Opcode::PushLiteral).lit(p);
    b.op(Opcode::PushLiteral).lit(value_name);
    b.op(Opcode::PushLiteral).lit(fifty_five);
    b.op(Opcode::Assign);
    b.op(Opcode::PropGetTwoLiterals).lit(p).lit(value_name);
    b.op(Opcode::AppendArray).byte(1);
    b.op(Opcode::Return);

    let result = vm.run_global(b.build()).expect("proxy reads run");
    let observed: Vec<i32> = vm
        .heap()
        .array_elements(result)
        .expect("array result")
        .iter()
        .map(|value| value.as_integer())
        .collect();
    assert_eq!(observed, vec![1, 2, 3, 56]);
    vm.free_value(result);
}

/// for-in over a proxy keeps the explicit TypeError.
#[test]
fn for_in_over_a_proxy_is_a_type_error() {
    let mut vm = Interpreter::new();
    proxy_counter_setup(&mut vm);

    let mut b = CodeBuilder::new();
    let p = b.ident("p");
    let exit = b.label();
    let body = b.label();
    b.op(Opcode::PushLiteral).lit(p);
    b.branch(Opcode::ForInInit, exit);
    b.bind(body);
    b.op(Opcode::ForInGetNext);
    b.op(Opcode::Pop);
    b.branch(Opcode::ForInHasNext, body);
    b.bind(exit);
    b.op(Opcode::PushUndefined);
    b.op(Opcode::Return);

    let error = vm.run_global(b.build()).expect_err("proxy for-in throws");
    match error {
        EngineError::Uncaught { kind, .. } => assert_eq!(kind, ExceptionKind::TypeError),
        other => panic!("unexpected error {other:?}"),
    }
}

/// for (let k in {a:0, b:0, c:0}) s += k
#[test]
fn for_in_concatenates_keys_in_insertion_order() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let s = b.register(0);
    let empty = b.string("");
    let zero = b.integer(0);
    let a = b.string("a");
    let b_name = b.string("b");
    let c = b.string("c");

    b.op(Opcode::AssignLiteralIdent).lit(empty).lit(s);

    b.op(Opcode::PushObject);
    b.op(Opcode::PushLiteral).lit(zero);
    b.op(Opcode::SetProperty).lit(a);
    b.op(Opcode::PushLiteral).lit(zero);
    b.op(Opcode::SetProperty).lit(b_name);
    b.op(Opcode::PushLiteral).lit(zero);
    b.op(Opcode::SetProperty).lit(c);

    let exit = b.label();
    let body = b.label();
    b.branch(Opcode::ForInInit, exit);
    b.bind(body);
    b.op(Opcode::PushLiteral).lit(s);
    b.op(Opcode::ForInGetNext);
    b.op(Opcode::Add);
    b.op(Opcode::AssignIdent).lit(s);
    b.branch(Opcode::ForInHasNext, body);
    b.bind(exit);
    b.op(Opcode::ReturnWithLiteral).lit(s);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("for-in runs");
    assert_eq!(&*vm.heap().string_of(result), "abc");
    vm.free_value(result);
}

/// for-of over an array through the built-in array iterator, with the
/// iterator closed on an abrupt break.
#[test]
fn for_of_iterates_and_sums() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let acc = b.register(0);
    let zero = b.integer(0);
    let one = b.integer(1);
    let two = b.integer(2);
    let three = b.integer(3);

    b.op(Opcode::AssignLiteralIdent).lit(zero).lit(acc);
    b.op(Opcode::PushArray);
    b.op(Opcode::PushLiteral).lit(one);
    b.op(Opcode::PushLiteral).lit(two);
    b.op(Opcode::PushLiteral).lit(three);
    b.op(Opcode::AppendArray).byte(3);

    let exit = b.label();
    let body = b.label();
    b.branch(Opcode::ForOfInit, exit);
    b.bind(body);
    b.op(Opcode::PushLiteral).lit(acc);
    b.op(Opcode::ForOfGetNext);
    b.op(Opcode::Add);
    b.op(Opcode::AssignIdent).lit(acc);
    b.branch(Opcode::ForOfHasNext, body);
    b.bind(exit);
    b.op(Opcode::ReturnWithLiteral).lit(acc);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("for-of runs");
    assert_eq!(result.as_integer(), 6);
}

/// The in operator consults the full has-property path.
#[test]
fn in_operator_checks_property_existence() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let obj = b.register(0);
    let key = b.string("present");
    let one = b.integer(1);

    b.op(Opcode::PushObject);
    b.op(Opcode::MovIdent).lit(obj);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(one);
    b.op(Opcode::Assign);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::In);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("in runs");
    assert!(result.is_true());
}

/// typeof on identifiers: resolved, unresolved and register-backed.
#[test]
fn typeof_of_an_unresolved_identifier_is_undefined() {
    let mut b = CodeBuilder::new();
    let missing = b.ident("missing");
    b.op(Opcode::TypeofIdent).lit(missing);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("typeof never throws here");
    assert_eq!(&*vm.heap().string_of(result), "undefined");
    vm.free_value(result);
}

/// Property-valued increments write back through the reference pair.
#[test]
fn property_post_increment_pushes_the_old_value() {
    let mut b = CodeBuilder::new();
    b.locals(1);
    let obj = b.register(0);
    let key = b.string("n");
    let ten = b.integer(10);

    b.op(Opcode::PushObject);
    b.op(Opcode::MovIdent).lit(obj);
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PushLiteral).lit(ten);
    b.op(Opcode::Assign);

    // old = obj.n++; old + obj.n = 10 + 11
    b.op(Opcode::PushLiteral).lit(obj);
    b.op(Opcode::PushLiteral).lit(key);
    b.op(Opcode::PropPostIncrPush);
    b.op(Opcode::PropGetTwoLiterals).lit(obj).lit(key);
    b.op(Opcode::Add);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("post increment runs");
    assert_eq!(result.as_integer(), 21);
}
