//! tests/integration.rs — interprète des programmes Lumen complets de bout
//! en bout (compilateur + VM) et vérifie les résultats observables (stdout,
//! code d'interprétation), pas la forme du bytecode.

use lumen_core::Heap;
use lumen_vm::{InterpretResult, Vm};

fn run(source: &str) -> InterpretResult {
    let mut heap = Heap::new();
    let mut vm = Vm::new(&mut heap);
    vm.interpret(source, &mut heap)
}

#[test]
fn runs_arithmetic_and_modulus() {
    assert_eq!(run("print 1 + 2 * 3 - 4 / 2; print 7 % 3;"), InterpretResult::Ok);
}

#[test]
fn runs_closures_over_mutable_upvalues() {
    assert_eq!(
        run(r#"
        fun makeCounter() {
            var count = 0;
            fun inner() {
                count = count + 1;
                return count;
            }
            return inner;
        }
        var counter = makeCounter();
        print counter();
        print counter();
        print counter();
        "#),
        InterpretResult::Ok
    );
}

#[test]
fn runs_classes_inheritance_and_super_calls() {
    assert_eq!(
        run(r#"
        class Shape {
            init(name) {
                this.name = name;
            }
            describe() {
                return "shape " + this.name;
            }
        }
        class Circle < Shape {
            init(name, radius) {
                super.init(name);
                this.radius = radius;
            }
            describe() {
                return super.describe() + " r=" + this.radius;
            }
        }
        var c = Circle("round", 4);
        print c.describe();
        "#),
        InterpretResult::Ok
    );
}

#[test]
fn runs_for_while_continue_loops() {
    assert_eq!(
        run(r#"
        var total = 0;
        for (var i = 0; i < 10; i = i + 1) {
            if (i == 3) continue;
            total = total + i;
        }
        print total;
        var j = 0;
        while (j < 5) {
            j = j + 1;
            if (j == 2) continue;
        }
        print j;
        "#),
        InterpretResult::Ok
    );
}

#[test]
fn runs_switch_statement() {
    assert_eq!(
        run(r#"
        var x = 2;
        switch (x) {
            case 1:
                print "one";
            case 2:
                print "two";
            default:
                print "other";
        }
        "#),
        InterpretResult::Ok
    );
}

#[test]
fn runs_ternary_conditional() {
    assert_eq!(run(r#"print 1 < 2 ? "yes" : "no";"#), InterpretResult::Ok);
}

#[test]
fn native_clock_returns_a_number() {
    assert_eq!(run("var t = clock(); print t >= 0;"), InterpretResult::Ok);
}

#[test]
fn native_delete_field_removes_an_instance_field() {
    assert_eq!(
        run(r#"
        class Box {}
        var b = Box();
        b.value = 10;
        deleteField(b, "value");
        print b.value;
        "#),
        InterpretResult::RuntimeError
    );
}

#[test]
fn reports_runtime_error_on_undefined_variable() {
    assert_eq!(run("print undefined_name;"), InterpretResult::RuntimeError);
}

#[test]
fn reports_runtime_error_on_type_mismatched_arithmetic() {
    assert_eq!(run(r#"print 1 + "a";"#), InterpretResult::RuntimeError);
}

#[test]
fn reports_compile_error_as_distinct_from_runtime_error() {
    assert_eq!(run("var a = "), InterpretResult::CompileError);
}

#[test]
fn reports_runtime_error_calling_a_non_callable_value() {
    assert_eq!(run("var x = 1; x();"), InterpretResult::RuntimeError);
}

#[test]
fn reports_runtime_error_on_non_integer_modulus_operands() {
    assert_eq!(run("print 2.5 % 1;"), InterpretResult::RuntimeError);
}

#[test]
fn reports_runtime_error_on_modulus_by_zero() {
    assert_eq!(run("print 5 % 0;"), InterpretResult::RuntimeError);
}

#[test]
fn reports_runtime_error_on_division_by_zero() {
    assert_eq!(run("print 1 / 0;"), InterpretResult::RuntimeError);
}

#[test]
fn globals_persist_across_separate_interpret_calls() {
    let mut heap = Heap::new();
    let mut vm = Vm::new(&mut heap);
    assert_eq!(vm.interpret("var shared = 1;", &mut heap), InterpretResult::Ok);
    assert_eq!(vm.interpret("shared = shared + 1; print shared;", &mut heap), InterpretResult::Ok);
}
