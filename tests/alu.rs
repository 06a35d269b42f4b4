use kestrel_vm::consts::{INTEGER_MULTIPLY_MAX, INTEGER_NUMBER_MAX, INTEGER_NUMBER_MIN};
use kestrel_vm::prelude::*;
use quickcheck_macros::quickcheck;

#[test]
fn add_two_variables() {
    // var a = 1; var b = 2; a + b
    let mut b = CodeBuilder::new();
    b.locals(2);
    let r0 = b.register(0);
    let r1 = b.register(1);
    let one = b.integer(1);
    let two = b.integer(2);
    b.op(Opcode::AssignLiteralIdent).lit(one).lit(r0);
    b.op(Opcode::AssignLiteralIdent).lit(two).lit(r1);
    b.op(Opcode::AddTwoLiterals).lit(r0).lit(r1);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("addition runs");
    assert!(result.is_integer());
    assert_eq!(result.as_integer(), 3);
}

#[test]
fn integer_addition_overflow_promotes_to_float() {
    let mut b = CodeBuilder::new();
    let max = b.integer(INTEGER_NUMBER_MAX);
    let one = b.integer(1);
    b.op(Opcode::AddTwoLiterals).lit(max).lit(one);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("overflow promotes");
    assert!(result.is_float());
    assert_eq!(
        vm.heap().number_of(result),
        INTEGER_NUMBER_MAX as f64 + 1.0
    );
    vm.free_value(result);
}

#[test]
fn integer_subtraction_underflow_promotes_to_float() {
    let mut b = CodeBuilder::new();
    let min = b.integer(INTEGER_NUMBER_MIN);
    let one = b.integer(1);
    b.op(Opcode::SubTwoLiterals).lit(min).lit(one);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("underflow promotes");
    assert!(result.is_float());
    assert_eq!(
        vm.heap().number_of(result),
        INTEGER_NUMBER_MIN as f64 - 1.0
    );
    vm.free_value(result);
}

#[test]
fn multiply_stays_unboxed_inside_the_window() {
    let mut b = CodeBuilder::new();
    let lhs = b.integer(11);
    let rhs = b.integer(11);
    b.op(Opcode::MulTwoLiterals).lit(lhs).lit(rhs);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("multiplication runs");
    assert!(result.is_integer());
    assert_eq!(result.as_integer(), 121);
}

#[test]
fn multiply_outside_the_window_goes_through_doubles() {
    let mut b = CodeBuilder::new();
    let lhs = b.integer(INTEGER_MULTIPLY_MAX + 1);
    let rhs = b.integer(INTEGER_MULTIPLY_MAX + 1);
    b.op(Opcode::MulTwoLiterals).lit(lhs).lit(rhs);
    b.op(Opcode::Return);

    let expected = (INTEGER_MULTIPLY_MAX as f64 + 1.0) * (INTEGER_MULTIPLY_MAX as f64 + 1.0);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("multiplication runs");
    assert!(result.is_float());
    assert_eq!(vm.heap().number_of(result), expected);
    vm.free_value(result);
}

#[test]
fn modulo_preserves_negative_zero_semantics() {
    // (-4) % 2 must not take the integer fast path: the result is -0.
    let mut b = CodeBuilder::new();
    let lhs = b.integer(-4);
    let rhs = b.integer(2);
    b.op(Opcode::ModTwoLiterals).lit(lhs).lit(rhs);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("modulo runs");
    assert!(result.is_float());
    let number = vm.heap().number_of(result);
    assert_eq!(number, 0.0);
    assert!(number.is_sign_negative());
    vm.free_value(result);
}

#[test]
fn string_addition_concatenates() {
    let mut b = CodeBuilder::new();
    let lhs = b.string("kes");
    let rhs = b.string("trel");
    b.op(Opcode::AddTwoLiterals).lit(lhs).lit(rhs);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("concatenation runs");
    assert!(result.is_string());
    assert_eq!(&*vm.heap().string_of(result), "kestrel");
    vm.free_value(result);
}

#[test]
fn bitwise_fast_paths_operate_on_tagged_words() {
    let mut b = CodeBuilder::new();
    let lhs = b.integer(0b1100);
    let rhs = b.integer(0b1010);
    b.op(Opcode::PushLiteral).lit(lhs);
    b.op(Opcode::PushLiteral).lit(rhs);
    b.op(Opcode::BitXor);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("xor runs");
    assert_eq!(result.as_integer(), 0b0110);
}

#[test]
fn bitwise_not_of_an_integer_stays_in_place() {
    let mut b = CodeBuilder::new();
    let operand = b.integer(41);
    b.op(Opcode::PushLiteral).lit(operand);
    b.op(Opcode::BitNot);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("not runs");
    assert_eq!(result.as_integer(), -42);
}

#[test]
fn unsigned_shift_of_negative_operand_boxes() {
    let mut b = CodeBuilder::new();
    let lhs = b.integer(-1);
    let rhs = b.integer(0);
    b.op(Opcode::PushLiteral).lit(lhs);
    b.op(Opcode::PushLiteral).lit(rhs);
    b.op(Opcode::UnsRightShift);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("shift runs");
    assert_eq!(vm.heap().number_of(result), u32::MAX as f64);
    vm.free_value(result);
}

#[test]
fn comparison_with_branch_fusion_counts_a_loop() {
    // i = 0; do { i = i + 1 } while (i < 10); i
    let mut b = CodeBuilder::new();
    b.locals(1);
    let i = b.register(0);
    let zero = b.integer(0);
    let one = b.integer(1);
    let ten = b.integer(10);

    b.op(Opcode::AssignLiteralIdent).lit(zero).lit(i);
    let top = b.label();
    b.bind(top);
    b.op(Opcode::AddTwoLiterals).lit(i).lit(one);
    b.op(Opcode::AssignIdent).lit(i);
    b.op(Opcode::LessTwoLiterals).lit(i).lit(ten);
    b.branch(Opcode::BranchIfTrueBackward2, top);
    b.op(Opcode::PushLiteral).lit(i);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("loop runs");
    assert_eq!(result.as_integer(), 10);
}

#[test]
fn loose_equality_coerces() {
    let mut b = CodeBuilder::new();
    let lhs = b.integer(1);
    let rhs = b.string("1");
    b.op(Opcode::PushLiteral).lit(lhs);
    b.op(Opcode::PushLiteral).lit(rhs);
    b.op(Opcode::Equal);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("equality runs");
    assert!(result.is_true());
}

#[test]
fn strict_equality_distinguishes_types() {
    let mut b = CodeBuilder::new();
    let lhs = b.integer(1);
    let rhs = b.string("1");
    b.op(Opcode::PushLiteral).lit(lhs);
    b.op(Opcode::PushLiteral).lit(rhs);
    b.op(Opcode::StrictEqual);
    b.op(Opcode::Return);

    let mut vm = Interpreter::new();
    let result = vm.run_global(b.build()).expect("equality runs");
    assert!(result.is_false());
}

#[quickcheck]
fn strict_equality_is_reflexive_except_nan(x: f64) -> bool {
    let mut heap = Heap::new();
    let value = heap.number_value(x);
    heap.strict_equals(value, value) == !x.is_nan()
}

#[quickcheck]
fn integers_never_equal_offset_floats(n: i16) -> bool {
    let mut heap = Heap::new();
    let tagged = Value::from_integer(n as i32);
    let boxed = heap.number_value(n as f64 + 0.5);
    !heap.strict_equals(tagged, boxed)
}
