//! Cur Compiler Library
//!
//! Compiles a single `.cur` source file to a C translation unit
//! (`output.c` + `output.h`), invokes the system C compiler to produce
//! a native executable, and optionally runs it.
//!
//! The pipeline is strictly sequential: lexing ([`lexer`]), parsing
//! ([`parser`]), semantic analysis ([`sema`], which mutates the AST in
//! place), then code generation ([`codegen`]). Every stage returns a
//! [`CompileResult`]; the first diagnostic aborts the compilation and
//! is printed as `file:row:col: error: message`.
//!
//! ```rust
//! let out = curc::compile_to_c("main :: fn() void { a: i32 = 42; }").unwrap();
//! assert!(out.code.contains("int main(int argc, const char **argv)"));
//! ```

pub mod ast;
pub mod codegen;
pub mod error;
pub mod eval;
pub mod keywords;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod typecheck;
pub mod types;

pub use codegen::{COutput, CompileFlags, OptLevel};
pub use error::{CompileResult, Cursor, Diagnostic};
pub use lexer::{Lexed, Token, lex};
pub use parser::parse;
pub use sema::{Dgraph, analyse};

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Options carried from the CLI into a build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Keep `output.c` / `output.h` after compilation.
    pub keepc: bool,
    /// Print the token stream before parsing.
    pub dump_tokens: bool,
    /// Print the parsed AST before analysis.
    pub dump_ast: bool,
}

/// The C compiler to invoke: `$CC`, or `cc` when unset.
fn c_compiler() -> String {
    env::var("CC").unwrap_or_else(|_| "cc".to_string())
}

/// Translate source text to C. This is the whole front end with no
/// file or process side effects, which makes it the test entry point.
pub fn compile_to_c(source: &str) -> Result<COutput, String> {
    translate(source).map_err(|d| d.to_string())
}

fn translate(source: &str) -> CompileResult<COutput> {
    let lexed = lexer::lex(source)?;
    assert_eq!(
        lexed.tokens.len(),
        lexed.cursors.len(),
        "token and cursor streams out of step"
    );
    let mut ast = parser::parse(&lexed)?;
    let dgraph = sema::analyse(&mut ast, &lexed.cursors)?;
    codegen::generate(&ast, &lexed.cursors, &dgraph)
}

/// Translate a source file to C, applying the debug dump options.
/// Diagnostics come back rendered with the filename.
pub fn translate_file(source_path: &Path, opts: &BuildOptions) -> Result<COutput, String> {
    let filename = source_path.display().to_string();
    let source = fs::read_to_string(source_path)
        .map_err(|e| format!("failed to read {}: {}", filename, e))?;

    let lexed = lexer::lex(&source).map_err(|d| d.render(&filename))?;
    if opts.dump_tokens {
        for tok in &lexed.tokens {
            println!("{}", tok.describe());
        }
    }

    let mut ast = parser::parse(&lexed).map_err(|d| d.render(&filename))?;
    if opts.dump_ast {
        for &id in &ast.top {
            println!("{:#?}", ast.stmnt(id));
        }
    }

    let dgraph = sema::analyse(&mut ast, &lexed.cursors).map_err(|d| d.render(&filename))?;
    codegen::generate(&ast, &lexed.cursors, &dgraph).map_err(|d| d.render(&filename))
}

/// Compile a `.cur` source file to a native executable. Returns the
/// executable's path. Intermediate `output.c`/`output.h` are removed
/// unless `keepc` is set.
pub fn compile_file(source_path: &Path, opts: &BuildOptions) -> Result<PathBuf, String> {
    let out = translate_file(source_path, opts)?;

    fs::write("output.h", &out.defs).map_err(|e| format!("failed to write output.h: {}", e))?;
    fs::write("output.c", &out.code).map_err(|e| format!("failed to write output.c: {}", e))?;

    let exe_name = if out.flags.output.is_empty() {
        source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    } else {
        out.flags.output.clone()
    };
    let exe = PathBuf::from(exe_name);

    let cc = c_compiler();
    let mut cmd = Command::new(&cc);
    cmd.arg("-o").arg(&exe).arg("output.c");
    for arg in out.flags.optimisation.cc_args() {
        cmd.arg(arg);
    }
    for link in &out.flags.links {
        cmd.arg(link);
    }

    let result = cmd
        .output()
        .map_err(|e| format!("failed to run {}: {}", cc, e))?;
    if !result.status.success() {
        return Err(format!(
            "C compilation failed:\n{}",
            String::from_utf8_lossy(&result.stderr)
        ));
    }

    if !opts.keepc {
        fs::remove_file("output.c").ok();
        fs::remove_file("output.h").ok();
    }

    Ok(exe)
}

/// Run a produced executable from the current directory with
/// inherited stdio. Returns its exit code.
pub fn run_executable(exe: &Path) -> Result<i32, String> {
    let path = if exe.is_absolute() || exe.components().count() > 1 {
        exe.to_path_buf()
    } else {
        Path::new(".").join(exe)
    };

    let status = Command::new(&path)
        .status()
        .map_err(|e| format!("failed to run `{}`: {}", path.display(), e))?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // The end-to-end scenarios: each source either produces C with the
    // expected shape or fails with the expected diagnostic.

    #[test]
    fn test_scenario_hello_ints() {
        let out = compile_to_c("main :: fn() void { a: i32 = 42; b := a + 1; }").unwrap();
        assert!(out.code.contains("int main(int argc, const char **argv)"));
        assert!(out.code.contains("i32 a = 42;"));
        assert!(out.code.contains("i32 b = a + 1;"));
    }

    #[test]
    fn test_scenario_option_capture() {
        let out =
            compile_to_c("f :: fn(x: ?i32) i32 { if (x) [v] { return v; } else { return -1; } }")
                .unwrap();
        assert!(out.code.contains("i32 v = x.some;"));
        assert!(out.code.contains("if (x.ok)"));
    }

    #[test]
    fn test_scenario_slice_argument_to_main() {
        let out = compile_to_c("main :: fn(args: []string) void { }").unwrap();
        assert!(out.code.contains("CurString _CUR_ARGS_[argc];"));
        assert!(
            out.code
                .contains("CurSlice_CurString args = curslice_CurString(_CUR_ARGS_, argc);")
        );
    }

    #[test]
    fn test_scenario_enum_auto_numbering() {
        let out = compile_to_c("Color :: enum { Red; Green = 10; Blue; }").unwrap();
        assert!(out.defs.contains("Color_Red = 0,"));
        assert!(out.defs.contains("Color_Green = 10,"));
        assert!(out.defs.contains("Color_Blue = 11,"));
    }

    #[test]
    fn test_scenario_cycle_rejected() {
        let err = compile_to_c("A :: struct { b: B }\nB :: struct { a: A }").unwrap_err();
        assert!(err.contains("cyclic dependency"));
        // anchored at A, the struct whose analysis discovered the cycle
        assert!(err.starts_with("1:1"));
    }

    #[test]
    fn test_scenario_overflow_rejected() {
        let err = compile_to_c("x: u8 = 256;").unwrap_err();
        assert!(err.contains("cannot be represented in u8"));
    }

    #[test]
    fn test_diagnostic_has_position() {
        let err = compile_to_c("main :: fn() void { y := missing; }").unwrap_err();
        assert!(err.contains("error:"));
        assert!(err.contains("use of undefined"));
    }

    #[test]
    fn test_translate_file_reports_with_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cur");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "main :: fn() void {{ x: u8 = 256; }}").unwrap();

        let err = translate_file(&path, &BuildOptions::default()).unwrap_err();
        assert!(err.contains("broken.cur"));
        assert!(err.contains("error: literal \"256\" cannot be represented in u8"));
    }

    #[test]
    fn test_translate_file_produces_both_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.cur");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "main :: fn() void {{ a: i32 = 1; }}").unwrap();

        let out = translate_file(&path, &BuildOptions::default()).unwrap();
        assert!(out.defs.contains("#ifndef CURRENT_DEFS_H"));
        assert!(out.code.contains("#include \"output.h\""));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = translate_file(Path::new("does-not-exist.cur"), &BuildOptions::default())
            .unwrap_err();
        assert!(err.contains("failed to read"));
    }
}
