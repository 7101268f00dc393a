//! tests/integration.rs — pilote `lumen_cli::run_from_args` sur des fichiers
//! temporaires, comme on invoquerait le binaire `lumen` depuis un shell,
//! sans dépendre de `std::env::args`.

use std::io::Write;

fn script_file(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("creating temp script file");
    write!(file, "{source}").expect("writing temp script file");
    file
}

#[test]
fn runs_a_script_file_to_completion() {
    let file = script_file("print 1 + 1;");
    let code = lumen_cli::run_from_args(["lumen", file.path().to_str().unwrap()]);
    assert_eq!(code, 0);
}

#[test]
fn reports_compile_error_exit_code() {
    let file = script_file("var a = ");
    let code = lumen_cli::run_from_args(["lumen", file.path().to_str().unwrap()]);
    assert_eq!(code, 65);
}

#[test]
fn reports_runtime_error_exit_code() {
    let file = script_file("print undefined_name;");
    let code = lumen_cli::run_from_args(["lumen", file.path().to_str().unwrap()]);
    assert_eq!(code, 70);
}

#[test]
fn missing_file_reports_io_error_exit_code() {
    let code = lumen_cli::run_from_args(["lumen", "/no/such/path/lumen-cli-test.lumen"]);
    assert_eq!(code, 74);
}

#[test]
fn disassemble_flag_does_not_execute_the_script() {
    let file = script_file("print 1 + 1;");
    let code = lumen_cli::run_from_args(["lumen", "--disassemble", file.path().to_str().unwrap()]);
    assert_eq!(code, 0);
}
