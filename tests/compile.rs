//! End-to-end tests driving `pcc::compile`/`compile_file` over small C
//! translation units, beyond the trivial smoke tests in `driver.rs` itself.
//! Each one checks that the driver produces usable output for a real
//! program, or a correctly classified error for a user-error stage.

use std::fs;

use pcc::config::{CompilerConfig, OptimizationLevel, OutputKind};
use pcc::driver::{compile, compile_file, CompileOutput};

fn assembly_for(source: &str, config: &CompilerConfig) -> String {
    let (output, diags, _files) = compile(source, "t.c", config).expect("compile succeeds");
    assert!(!diags.has_errors(), "unexpected errors for: {source}");
    match output {
        CompileOutput::Assembly(text) => text,
        CompileOutput::Object(_) => panic!("expected assembly output"),
    }
}

#[test]
fn struct_and_function_call_round_trip() {
    let source = r#"
        struct point { int x; int y; };
        int add(int a, int b) { return a + b; }
        int sum_point(struct point p) { return add(p.x, p.y); }
        int main(void) {
            struct point p;
            p.x = 3;
            p.y = 4;
            return sum_point(p);
        }
    "#;
    let config = CompilerConfig::new().with_output_kind(OutputKind::Assembly);
    let asm = assembly_for(source, &config);
    assert!(asm.contains("sum_point"));
    assert!(asm.contains("add"));
}

#[test]
fn bitfield_access_lowers_without_errors() {
    let source = r#"
        struct flags { unsigned a : 3; unsigned b : 5; unsigned c : 8; };
        int read_b(struct flags *f) { return f->b; }
        void set_c(struct flags *f, int v) { f->c = v; }
        int main(void) {
            struct flags f;
            f.a = 1;
            f.b = 2;
            set_c(&f, 200);
            return read_b(&f);
        }
    "#;
    let config = CompilerConfig::new().with_output_kind(OutputKind::Assembly);
    let asm = assembly_for(source, &config);
    assert!(asm.contains("read_b"));
    assert!(asm.contains("set_c"));
}

#[test]
fn switch_with_fallthrough_and_goto() {
    let source = r#"
        int classify(int x) {
            switch (x) {
            case 0:
            case 1:
                goto small;
            case 2:
                return 2;
            default:
                return -1;
            }
        small:
            return 0;
        }
        int main(void) { return classify(1); }
    "#;
    let config = CompilerConfig::new().with_output_kind(OutputKind::Assembly);
    let asm = assembly_for(source, &config);
    assert!(asm.contains("classify"));
}

#[test]
fn optimizer_pipeline_runs_without_changing_observable_result() {
    let source = r#"
        int compute(int n) {
            int acc = 0;
            for (int i = 0; i < n; i = i + 1) {
                acc = acc + i;
            }
            return acc;
        }
        int main(void) { return compute(10); }
    "#;
    let o0 = CompilerConfig::new().with_opt_level(OptimizationLevel::O0).with_output_kind(OutputKind::Assembly);
    let o1 = CompilerConfig::new().with_opt_level(OptimizationLevel::O1).with_output_kind(OutputKind::Assembly);
    let asm_o0 = assembly_for(source, &o0);
    let asm_o1 = assembly_for(source, &o1);
    assert!(asm_o0.contains("compute"));
    assert!(asm_o1.contains("compute"));
}

#[test]
fn global_initializers_and_string_literals() {
    let source = r#"
        const char *greeting = "hello";
        int counter = 41;
        int bump(void) { counter = counter + 1; return counter; }
        int main(void) { return bump(); }
    "#;
    let config = CompilerConfig::new().with_output_kind(OutputKind::Assembly);
    let asm = assembly_for(source, &config);
    assert!(asm.contains("counter"));
    assert!(asm.contains("greeting"));
}

#[test]
fn object_emission_produces_nonempty_bytes() {
    let source = "int main(void) { return 42; }";
    let config = CompilerConfig::new().with_output_kind(OutputKind::Object);
    let (output, diags, _files) = compile(source, "t.c", &config).expect("compile succeeds");
    assert!(!diags.has_errors());
    match output {
        CompileOutput::Object(bytes) => assert!(!bytes.is_empty()),
        CompileOutput::Assembly(_) => panic!("expected object output"),
    }
}

#[test]
fn object_emission_handles_structs_globals_and_narrow_locals() {
    let source = r#"
        struct point { int x; int y; };
        int counter = 41;
        const char *greeting = "hello";
        int sum_point(struct point p) { return p.x + p.y; }
        int bump(void) { counter = counter + 1; return counter; }
        int main(void) {
            struct point p;
            p.x = 3;
            p.y = 4;
            short s = (short)sum_point(p);
            return s + bump();
        }
    "#;
    let config = CompilerConfig::new().with_output_kind(OutputKind::Object);
    let (output, diags, _files) = compile(source, "t.c", &config).expect("compile succeeds");
    assert!(!diags.has_errors());
    match output {
        CompileOutput::Object(bytes) => assert!(!bytes.is_empty()),
        CompileOutput::Assembly(_) => panic!("expected object output"),
    }
}

#[test]
fn compile_file_writes_output_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in.c");
    let output = dir.path().join("out.s");
    fs::write(&input, "int main(void) { return 0; }").expect("write input");

    let config = CompilerConfig::new().with_output_kind(OutputKind::Assembly);
    compile_file(&input, &output, &config).expect("compile_file succeeds");

    let written = fs::read_to_string(&output).expect("read output");
    assert!(written.contains("main"));
}

#[test]
fn undeclared_function_call_is_a_user_error() {
    let source = "int main(void) { return missing(1, 2); }";
    let config = CompilerConfig::new();
    let err = compile(source, "t.c", &config).expect_err("undeclared function is a user error");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn static_assert_failure_is_a_user_error() {
    let source = r#"
        _Static_assert(1 == 2, "never true");
        int main(void) { return 0; }
    "#;
    let config = CompilerConfig::new();
    let err = compile(source, "t.c", &config).expect_err("failed static assert is a user error");
    assert_eq!(err.exit_code(), 1);
}
