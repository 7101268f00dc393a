//! tests/integration.rs — compile des programmes Lumen complets et vérifie
//! les diagnostics observables (succès/échec), pas la forme exacte du
//! bytecode (couverte par les tests unitaires de `lumen-core`).

use lumen_core::Heap;

fn compiles(source: &str) -> bool {
    let mut heap = Heap::new();
    lumen_compiler::compile(source, &mut heap).is_some()
}

#[test]
fn compiles_arithmetic_and_print() {
    assert!(compiles("print 1 + 2 * 3 - 4 / 2;"));
}

#[test]
fn compiles_var_and_block_scopes() {
    assert!(compiles(
        r#"
        var a = 1;
        {
            var a = 2;
            print a;
        }
        print a;
        "#
    ));
}

#[test]
fn compiles_functions_and_closures() {
    assert!(compiles(
        r#"
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
        "#
    ));
}

#[test]
fn compiles_classes_inheritance_and_super() {
    assert!(compiles(
        r#"
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
        "#
    ));
}

#[test]
fn compiles_for_while_continue_and_break_free_loops() {
    assert!(compiles(
        r#"
        for (var i = 0; i < 10; i = i + 1) {
            if (i == 3) continue;
            print i;
        }
        var j = 0;
        while (j < 5) {
            j = j + 1;
            if (j == 2) continue;
            print j;
        }
        "#
    ));
}

#[test]
fn compiles_switch_with_multiple_cases_and_default() {
    assert!(compiles(
        r#"
        var x = 2;
        switch (x) {
            case 1:
                print "one";
            case 2:
                print "two";
            default:
                print "other";
        }
        "#
    ));
}

#[test]
fn compiles_ternary_conditional_expression() {
    assert!(compiles("print 1 < 2 ? \"yes\" : \"no\";"));
}

#[test]
fn reports_error_on_missing_semicolon() {
    assert!(!compiles("var a = 1"));
}

#[test]
fn reports_error_on_continue_outside_loop() {
    assert!(!compiles("continue;"));
}

#[test]
fn reports_error_on_this_outside_class() {
    assert!(!compiles("print this;"));
}

#[test]
fn reports_error_on_return_outside_function() {
    assert!(!compiles("return 1;"));
}

#[test]
fn recovers_after_error_and_keeps_scanning_for_more_diagnostics() {
    // Les deux erreurs sont rapportées séparément grâce à `synchronize`,
    // mais le résultat global reste un échec de compilation.
    assert!(!compiles("var a = ; var b = ;"));
}
