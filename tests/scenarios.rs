//! End-to-end scenarios from spec §8 "Concrete scenarios", plus the §8
//! round-trip laws and invariants that only make sense exercised against a
//! real compile-then-run pipeline rather than a single module in isolation.

use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use ascension::host::NullHost;
use ascension::{Compiler, Vm};

/// A `Write` sink the test keeps a handle to after it's moved into the `Vm`,
/// so captured `print` output can be inspected once the program finishes.
#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

/// Compile and run `source`, returning everything `print` wrote, one line
/// per `PRINT` opcode.
fn run(source: &str) -> String {
    let program = Compiler::compile(source, Path::new(".")).expect("compiles");
    let capture = Capture::default();
    let mut vm = Vm::with_output(Box::new(NullHost), Box::new(capture.clone()));
    vm.run(&program).expect("runs");
    capture.text()
}

#[test]
fn scenario_recursion_via_prototype() {
    let src = r#"
        func even(n);
        func odd(n) { if (n==0) { return 0; } return even(n-1); }
        func even(n) { if (n==0) { return 1; } return odd(n-1); }
        print(even(10));
    "#;
    assert_eq!(run(src), "1\n");
}

#[test]
fn scenario_nested_for_with_matrix() {
    let src = r#"
        m = matrix(2,3,0);
        for (i=0;i<2;i+=1){ for(j=0;j<3;j+=1){ m[i,j]=i*3+j; } }
        print(m[1][2]);
        print(rows(m)*cols(m));
    "#;
    assert_eq!(run(src), "5\n6\n");
}

#[test]
fn scenario_try_catch_across_a_call() {
    let src = r#"
        func bad(){ throw "oops"; }
        try { bad(); print("unreached"); } catch(e) { print(e); }
    "#;
    assert_eq!(run(src), "oops\n");
}

#[test]
fn scenario_string_concatenation_coercion() {
    let src = r#"
        x = 3;
        print("v=" + x);
    "#;
    assert_eq!(run(src), "v=3\n");
}

#[test]
fn scenario_switch_without_fallthrough() {
    let src = r#"
        x=2;
        switch(x){ case 1:{ print("a"); }; case 2:{ print("b"); }; default:{ print("d"); }; }
    "#;
    assert_eq!(run(src), "b\n");
}

#[test]
fn scenario_dict_literal_and_access() {
    let src = r#"
        d = {"name":"A","age":7};
        print(d.name, d.age);
    "#;
    assert_eq!(run(src), "A 7\n");
}

#[test]
fn undefined_function_prototype_aborts_compilation() {
    let err = Compiler::compile("func f(a);", Path::new(".")).unwrap_err();
    assert_eq!(err.kind, ascension::ErrorKind::LinkerError);
}

#[test]
fn prototype_arity_mismatch_aborts_compilation() {
    let err = Compiler::compile("func f(a); func f(a,b) { return 1; }", Path::new(".")).unwrap_err();
    assert_eq!(err.kind, ascension::ErrorKind::PrototypeError);
}

#[test]
fn division_by_zero_is_catchable() {
    let src = r#"
        try { x = 1 / 0; } catch (e) { print("caught", e); }
    "#;
    assert_eq!(run(src), "caught DivisionByZero: division by zero\n");
}

#[test]
fn jz_treats_null_as_falsy() {
    let src = r#"
        if (NULL) { print("truthy"); } else { print("falsy"); }
    "#;
    assert_eq!(run(src), "falsy\n");
}

#[test]
fn eq_distinguishes_null_from_zero() {
    let src = r#"
        x = NULL;
        if (x == 0) { print("equal"); } else { print("distinct"); }
    "#;
    assert_eq!(run(src), "distinct\n");
}

#[test]
fn undefined_variable_loads_as_zero_in_arithmetic() {
    let src = "print(undeclared + 1);";
    assert_eq!(run(src), "1\n");
}

#[test]
fn break_and_continue_cross_nested_loops_correctly() {
    let src = r#"
        total = 0;
        for (i=0;i<5;i+=1) {
            if (i == 3) { break; }
            if (i == 1) { continue; }
            total += i;
        }
        print(total);
    "#;
    // i=0 -> total=0; i=1 -> continue; i=2 -> total=2; i=3 -> break.
    assert_eq!(run(src), "2\n");
}

#[test]
fn keys_round_trip_over_a_struct_excludes_type_tag() {
    let src = r#"
        struct Point { x, y }
        p = new Point();
        ks = keys(p);
        print(ks[0], ks[1]);
    "#;
    assert_eq!(run(src), "x y\n");
}

#[test]
fn matrix_bounds_report_rows_and_cols_via_dim() {
    let src = r#"
        m = matrix(3,4,0);
        d = dim(m);
        print(d[0], d[1]);
    "#;
    assert_eq!(run(src), "3 4\n");
}

#[test]
fn include_recursively_flattens_a_relative_file() {
    let dir = std::env::temp_dir().join(format!("ascension-include-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("helper.asc"), r#"func double(n) { return n * 2; }"#).unwrap();
    let main_path = dir.join("main.asc");
    std::fs::write(&main_path, r#"include "helper.asc"; print(double(21));"#).unwrap();

    let source = std::fs::read_to_string(&main_path).unwrap();
    let program = Compiler::compile(&source, &dir).expect("compiles with include");
    let capture = Capture::default();
    let mut vm = Vm::with_output(Box::new(NullHost), Box::new(capture.clone()));
    vm.run(&program).expect("runs");
    assert_eq!(capture.text(), "42\n");

    let _ = std::fs::remove_dir_all(&dir);
}

mod round_trip_laws {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `to_int(chr(n)) == n` for every `n` in `[0, 127]` (spec §8).
        #[test]
        fn chr_then_to_int_is_identity(n in 0i64..128) {
            let src = format!("print(to_int(chr({n})));");
            prop_assert_eq!(run(&src), format!("{n}\n"));
        }

        /// `len(substr(s, i, k)) == min(k, len(s) - i)` for a fixed ASCII
        /// string and every in-range start/length pair (spec §8).
        #[test]
        fn substr_length_matches_clamped_bound(i in 0usize..=11, k in 0usize..15) {
            let src = format!(r#"print(len(substr("hello world!", {i}, {k})));"#);
            let expected = k.min(12usize.saturating_sub(i));
            prop_assert_eq!(run(&src), format!("{expected}\n"));
        }
    }
}
