use indoc::indoc;

use super::Vm;
use crate::error::{Error, VmError};
use crate::heap::{Heap, HeapConfig};
use crate::{bytecode, syntax};

const TEST_HEAP: usize = 64 * 1024;

fn config(heap_size: usize) -> HeapConfig {
  HeapConfig {
    heap_size,
    heap_log: None,
  }
}

fn run_with_heap(src: &str, heap_size: usize) -> crate::Result<String> {
  let top = syntax::parse(src)?;
  let program = bytecode::compile(&top)?;
  let heap = Heap::new(&config(heap_size))?;
  let mut out = Vec::new();
  Vm::new(program, heap, Box::new(&mut out))?.run()?;
  Ok(String::from_utf8(out).expect("program output is utf-8"))
}

fn run(src: &str) -> crate::Result<String> {
  run_with_heap(src, TEST_HEAP)
}

fn interpret(src: &str) -> crate::Result<String> {
  let mut out = Vec::new();
  crate::ast_interpret(src, &mut out)?;
  Ok(String::from_utf8(out).expect("program output is utf-8"))
}

fn roundtrip(src: &str) -> crate::Result<String> {
  let top = syntax::parse(src)?;
  let program = bytecode::compile(&top)?;
  let mut bytes = Vec::new();
  bytecode::serialize(&program, &mut bytes)?;
  let program = bytecode::deserialize(&bytes)?;
  let heap = Heap::new(&config(TEST_HEAP))?;
  let mut out = Vec::new();
  Vm::new(program, heap, Box::new(&mut out))?.run()?;
  Ok(String::from_utf8(out).expect("program output is utf-8"))
}

/// Asserts that direct execution, the serialized round trip, and the AST
/// interpreter all produce exactly `expected`.
macro_rules! check {
  ($name:ident, $src:literal, $expected:literal) => {
    #[test]
    fn $name() {
      let src = indoc!($src);
      match run(src) {
        Ok(output) => assert_eq!(output, $expected, "run output differs:\n{src}"),
        Err(e) => panic!("run failed: {e}\n{src}"),
      }
      match roundtrip(src) {
        Ok(output) => assert_eq!(output, $expected, "round-trip output differs:\n{src}"),
        Err(e) => panic!("round-trip failed: {e}\n{src}"),
      }
      match interpret(src) {
        Ok(output) => assert_eq!(output, $expected, "ast_interpret output differs:\n{src}"),
        Err(e) => panic!("ast_interpret failed: {e}\n{src}"),
      }
    }
  };
}

/// Asserts that both backends fail with the given error.
macro_rules! check_err {
  ($name:ident, $src:literal, $pattern:pat) => {
    #[test]
    fn $name() {
      let src = indoc!($src);
      let err = run(src).expect_err("vm run should fail");
      assert!(matches!(err, $pattern), "vm error was {err:?}");
      let err = interpret(src).expect_err("ast_interpret should fail");
      assert!(matches!(err, $pattern), "ast error was {err:?}");
    }
  };
}

check! {
  print_operator_call,
  r#"print("~\n", 1.+(2))"#,
  "3\n"
}

check! {
  while_countdown,
  r#"let x = 10; while x > 0 do x = x.-(1); print("done ~\n", x)"#,
  "done 0\n"
}

check! {
  array_set_and_get,
  r#"let a = [3; 0]; a[1] = 7; print("~ ~ ~\n", a[0], a[1], a[2])"#,
  "0 7 0\n"
}

check! {
  object_with_method,
  r#"let o = object extends null { let v = 5; function get() -> this.v }; print("~\n", o.get())"#,
  "5\n"
}

check! {
  method_inheritance,
  r#"let p = object { function m() -> 1 }; let c = object extends p {}; print("~\n", c.m())"#,
  "1\n"
}

check! {
  forward_global,
  r#"function f() -> g(); let g = function() -> 42; print("~\n", f())"#,
  "42\n"
}

check! {
  integer_arithmetic,
  r#"print("~ ~ ~ ~ ~\n", 7 + 3, 7 - 3, 7 * 3, 7 / 3, 7 % 3)"#,
  "10 4 21 2 1\n"
}

check! {
  integer_comparisons,
  r#"print("~ ~ ~ ~ ~ ~\n", 1 < 2, 2 <= 1, 3 > 2, 2 >= 3, 1 == 1, 1 != 1)"#,
  "true false true false true false\n"
}

check! {
  boolean_operators,
  r#"print("~ ~\n", true & false, false | true)"#,
  "false true\n"
}

check! {
  cross_kind_equality,
  r#"print("~ ~ ~ ~\n", 1 == true, null == null, 1 != null, true == true)"#,
  "false true true true\n"
}

check! {
  null_is_falsy,
  r#"print("~ ~\n", if null then 1 else 2, if 0 then 3 else 4)"#,
  "2 3\n"
}

check! {
  block_value_and_mutation,
  r#"
    let x = 1;
    begin let y = 2; x = x + y end;
    print("~\n", x)
  "#,
  "3\n"
}

check! {
  block_scoping_shadows,
  r#"
    let x = 1;
    begin let x = 2; print("inner ~\n", x) end;
    print("outer ~\n", x)
  "#,
  "inner 2\nouter 1\n"
}

check! {
  empty_block_is_null,
  r#"print("~\n", begin end)"#,
  "null\n"
}

check! {
  while_value_is_last_iteration,
  r#"let x = 0; print("~\n", while x < 3 do x = x + 1)"#,
  "3\n"
}

check! {
  while_that_never_runs_is_null,
  r#"print("~\n", while false do 1)"#,
  "null\n"
}

check! {
  if_without_else_is_null,
  r#"print("~\n", if false then 1)"#,
  "null\n"
}

check! {
  recursion,
  r#"
    function fib(n) -> if n < 2 then n else fib(n - 1) + fib(n - 2);
    print("~\n", fib(10))
  "#,
  "55\n"
}

check! {
  mutual_recursion_through_forward_globals,
  r#"
    function even(n) -> if n == 0 then true else odd(n - 1);
    function odd(n) -> if n == 0 then false else even(n - 1);
    print("~ ~\n", even(10), odd(7))
  "#,
  "true true\n"
}

check! {
  dynamic_array_initializer_runs_per_element,
  r#"
    let n = 0;
    let a = [3; begin n = n + 1; n end];
    print("~ ~ ~\n", a[0], a[1], a[2])
  "#,
  "1 2 3\n"
}

check! {
  nested_arrays_get_fresh_rows,
  r#"
    let m = [2; [2; 0]];
    let row = m[0];
    row[1] = 5;
    print("~ ~\n", m[0][1], m[1][1])
  "#,
  "5 0\n"
}

check! {
  array_printing,
  r#"print("~\n", [3; 7])"#,
  "[7, 7, 7]\n"
}

check! {
  object_printing,
  r#"
    let p = object { let a = 1 };
    let c = object extends p { let b = 2 };
    print("~\n", c)
  "#,
  "object(..=object(a=1), b=2)\n"
}

check! {
  objects_extend_primitives,
  r#"let o = object extends 5 {}; print("~\n", o.+(2))"#,
  "7\n"
}

check! {
  field_assignment_through_method,
  r#"
    let counter = object { let n = 0; function inc() -> this.n = this.n + 1 };
    counter.inc();
    counter.inc();
    print("~\n", counter.n)
  "#,
  "2\n"
}

check! {
  inherited_field_assignment_writes_ancestor,
  r#"
    let base = object { let v = 1 };
    let derived = object extends base {};
    derived.v = 9;
    print("~ ~\n", base.v, derived.v)
  "#,
  "9 9\n"
}

check! {
  unbound_assignment_defines_a_global,
  r#"
    function set() -> g = 5;
    set();
    print("~\n", g)
  "#,
  "5\n"
}

check! {
  undefined_global_reads_null,
  r#"print("~\n", nothing)"#,
  "null\n"
}

check! {
  functions_do_not_close_over_locals,
  r#"
    function outer() -> begin
      let secret = 5;
      function inner() -> secret;
      inner()
    end;
    print("~\n", outer())
  "#,
  "null\n"
}

check! {
  this_is_null_in_plain_calls,
  r#"function f() -> this; print("~\n", f())"#,
  "null\n"
}

check! {
  print_returns_null,
  r#"print("~\n", print("x\n"))"#,
  "x\nnull\n"
}

check! {
  format_escapes,
  r#"print("a\tb\~c\\d\n")"#,
  "a\tb~c\\d\n"
}

check! {
  empty_program,
  "",
  ""
}

check_err! {
  division_by_zero,
  r#"print("~\n", 1 / 0)"#,
  Error::Vm(VmError::DivisionByZero)
}

check_err! {
  modulo_by_zero,
  r#"print("~\n", 1 % 0)"#,
  Error::Vm(VmError::DivisionByZero)
}

check_err! {
  array_get_out_of_bounds,
  r#"let a = [1; 0]; a[2]"#,
  Error::Vm(VmError::IndexOutOfBounds { .. })
}

check_err! {
  array_set_out_of_bounds,
  r#"let a = [1; 0]; a[5] = 1"#,
  Error::Vm(VmError::IndexOutOfBounds { .. })
}

check_err! {
  wrong_argument_count,
  r#"function f(x) -> x; f()"#,
  Error::Vm(VmError::WrongArity { .. })
}

check_err! {
  calling_a_non_function,
  r#"let x = 5; x()"#,
  Error::Vm(VmError::NotAFunction)
}

check_err! {
  field_not_found,
  r#"let o = object { let a = 1 }; o.b"#,
  Error::Vm(VmError::FieldNotFound(_))
}

check_err! {
  unknown_builtin_method,
  r#"true.foo()"#,
  Error::Vm(VmError::UnknownMethod(_))
}

check_err! {
  operator_type_mismatch,
  r#"1 + true"#,
  Error::Vm(VmError::TypeMismatch(_))
}

#[test]
fn transient_garbage_is_reclaimed() {
  // the loop allocates far more than the heap holds; it only completes if
  // unreachable arrays are collected
  let src = indoc! {r#"
    let i = 0;
    while i < 2000 do begin
      let a = [10; 0];
      a[1] = i;
      i = i + 1
    end;
    print("ok ~\n", i)
  "#};
  let output = run_with_heap(src, 16 * 1024).unwrap();
  assert_eq!(output, "ok 2000\n");
}

#[test]
fn live_values_survive_collections() {
  let src = indoc! {r#"
    let keep = [8; 1];
    let i = 0;
    while i < 500 do begin
      let t = [16; i];
      keep[0] = keep[0] + 1;
      i = i + 1
    end;
    print("~\n", keep[0])
  "#};
  let output = run_with_heap(src, 8 * 1024).unwrap();
  assert_eq!(output, "501\n");
}

#[test]
fn heap_exhaustion_is_fatal() {
  let err = run_with_heap("let a = [100000; 0]", 16 * 1024).unwrap_err();
  assert!(matches!(err, Error::HeapExhausted { .. }), "{err:?}");
}

#[test]
fn heap_invariants_hold_at_safe_points() {
  let src = indoc! {r#"
    let o = object { let xs = [4; 1]; function bump() -> this.xs[0] = this.xs[0] + 1 };
    let i = 0;
    while i < 100 do begin o.bump(); i = i + 1 end;
    print("~\n", o.xs[0])
  "#};
  let top = syntax::parse(src).unwrap();
  let program = bytecode::compile(&top).unwrap();
  let heap = Heap::new(&config(8 * 1024)).unwrap();
  let mut out = Vec::new();
  let mut vm = Vm::new(program, heap, Box::new(&mut out)).unwrap();
  vm.run().unwrap();
  // collect at a safe point and re-check the heap partition
  vm.collect_garbage();
  assert!(vm.heap().verify_partition());
  assert!(vm.heap().validate_tags());
  drop(vm);
  assert_eq!(String::from_utf8(out).unwrap(), "101\n");
}
