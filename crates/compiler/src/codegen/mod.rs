//! C code generation.
//!
//! The generator walks the analysed AST once and fills two buffers:
//!
//! - `defs` — the header (`output.h`): the builtin prelude, forward
//!   typedefs, generic container instantiations, struct/enum
//!   definitions and function prototypes.
//! - `code` — the translation unit (`output.c`): `#include "output.h"`,
//!   generic `…Imp` expansions, globals and function bodies.
//!
//! # Key Concepts
//!
//! ## Generic instantiation
//!
//! Arrays, slices and options are parametric in their element type.
//! The first time one is used, the generator synthesises a mangled
//! name (`CurSlice_i32`, `CurArray1d_i325`, `CurOption_CurString`) and
//! expands the corresponding `…Def` macro into `defs` and `…Imp` into
//! `code` at insertion points recorded just before the declaration
//! that needed them. An interning set guarantees each instantiation is
//! emitted at most once. See `generics.rs`.
//!
//! ## Definition ordering
//!
//! Struct and enum bodies are not emitted where declared; they are
//! resolved after the main walk in dependency post-order (from the
//! dgraph built during analysis), so full definitions appear after
//! their value prerequisites and after the forward typedefs emitted
//! on first reference. See `program.rs`.
//!
//! ## Defers
//!
//! `defer` statements are pushed onto a stack tagged with block depth
//! and replayed in reverse before `return` (all), `break`/`continue`
//! (same depth), and at scope exit. See `statements.rs`.
//!
//! # Module Structure
//!
//! - `state.rs`: generator state, buffers, flags, defer stack
//! - `prelude.rs`: the fixed C prelude text
//! - `generics.rs`: mangling and instantiation interning
//! - `exprs.rs`: expression lowering
//! - `statements.rs`: statement lowering
//! - `program.rs`: top-level walk, `main` rewriting, dgraph ordering

mod exprs;
mod generics;
mod prelude;
mod program;
mod state;
mod statements;

pub use program::{COutput, generate};
pub use state::{CodeGen, CompileFlags, OptLevel};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::sema::analyse;

    fn emit(src: &str) -> COutput {
        let lexed = lex(src).unwrap();
        let mut ast = parse(&lexed).unwrap();
        let dgraph = analyse(&mut ast, &lexed.cursors).unwrap();
        generate(&ast, &lexed.cursors, &dgraph).unwrap()
    }

    #[test]
    fn test_hello_ints() {
        let out = emit("main :: fn() void { a: i32 = 42; b := a + 1; }");
        assert!(out.code.contains("int main(int argc, const char **argv)"));
        assert!(out.code.contains("i32 a = 42;"));
        assert!(out.code.contains("i32 b = a + 1;"));
        assert!(out.defs.starts_with("#ifndef CURRENT_DEFS_H"));
        assert!(out.defs.trim_end().ends_with("#endif // CURRENT_DEFS_H"));
        assert!(out.code.starts_with("#include \"output.h\"\n"));
    }

    #[test]
    fn test_prototypes_go_to_defs() {
        let out = emit("add :: fn(a: i32, b: i32) i32 { return a + b; }\nmain :: fn() void { }");
        assert!(out.defs.contains("i32 add(i32 a, i32 b);"));
        assert!(out.code.contains("i32 add(i32 a, i32 b) {"));
        assert!(out.code.contains("return a + b;"));
    }

    #[test]
    fn test_main_argv_preamble() {
        let out = emit("main :: fn(args: []string) void { }");
        assert!(out.defs.contains("CurSliceDef(CurString, CurString);"));
        assert!(out.code.contains("CurSliceImp(CurString, CurString);"));
        assert!(out.code.contains("CurString _CUR_ARGS_[argc];"));
        assert!(
            out.code
                .contains("CurSlice_CurString args = curslice_CurString(_CUR_ARGS_, argc);")
        );
    }

    #[test]
    fn test_option_instantiated_once() {
        let out = emit(
            "f :: fn(x: ?i32) i32 { if (x) [v] { return v; } else { return -1; } }\n\
             g :: fn(y: ?i32) void { }\nmain :: fn() void { }",
        );
        assert_eq!(out.defs.matches("CurOptionDef(i32, i32);").count(), 1);
        assert_eq!(out.code.matches("CurOptionImp(i32, i32);").count(), 1);
    }

    #[test]
    fn test_option_capture_lowering() {
        let out = emit("f :: fn(x: ?i32) i32 { if (x) [v] { return v; } else { return -1; } }\nmain :: fn() void { }");
        assert!(out.code.contains("i32 v = x.some;"));
        assert!(out.code.contains("if (x.ok) {"));
    }

    #[test]
    fn test_null_and_wrap() {
        let out = emit("main :: fn() void { x: ?i32 = null; y: ?i32 = 5; }");
        assert!(out.code.contains("CurOption_i32 x = curoptionnull_i32();"));
        assert!(out.code.contains("CurOption_i32 y = curoption_i32(5);"));
    }

    #[test]
    fn test_enum_numbering_and_access() {
        let out = emit(
            "Color :: enum { Red; Green = 10; Blue; }\n\
             main :: fn() void { c := Color.Green; }",
        );
        assert!(out.defs.contains("typedef enum Color Color;"));
        assert!(out.defs.contains("Color_Red = 0,"));
        assert!(out.defs.contains("Color_Green = 10,"));
        assert!(out.defs.contains("Color_Blue = 11,"));
        assert!(out.code.contains("Color c = Color_Green;"));
    }

    #[test]
    fn test_struct_definition_order() {
        let out = emit(
            "Outer :: struct { inner: Inner }\n\
             Inner :: struct { x: i32 }\n\
             main :: fn() void { o: Outer = Outer{Inner{1}}; }",
        );
        let inner_at = out.defs.find("struct Inner {").unwrap();
        let outer_at = out.defs.find("struct Outer {").unwrap();
        assert!(inner_at < outer_at, "Inner must be defined before Outer");
    }

    #[test]
    fn test_array_literal_and_default() {
        let out = emit("main :: fn() void { a := [3]i32{1, 2, 3}; b: [2]u8; }");
        assert!(out.defs.contains("CurArray1dDef(i32, i32, 3);"));
        assert!(
            out.code
                .contains("CurArray1d_i323 a = curarray1d_i323((i32[3]){1, 2, 3}, 3);")
        );
        assert!(
            out.code
                .contains("CurArray1d_u82 b = curarray1d_u82((u8[2]){}, 2);")
        );
    }

    #[test]
    fn test_string_literal_lowering() {
        let out = emit("main :: fn() void { s := \"hi\\n\"; c := c\"raw\"; }");
        assert!(out.code.contains("CurString s = curstr(\"hi\\n\");"));
        assert!(out.code.contains("const char* c = \"raw\";"));
    }

    #[test]
    fn test_logical_ops_lowered() {
        let out = emit("main :: fn() void { a := true; b := false; c := a and b or !a; }");
        assert!(out.code.contains("a && b || !a"));
    }

    #[test]
    fn test_defer_before_return_and_break() {
        let out = emit(
            "done :: fn() void { }\n\
             f :: fn() void { defer done(); return; }\n\
             g :: fn() void { for (i: i32 = 0; i < 3; i = i + 1) { defer done(); break; } }\n\
             main :: fn() void { }",
        );
        // the deferred call precedes the return
        let call_at = out.code.find("done();").unwrap();
        let return_at = out.code.find("return;").unwrap();
        assert!(call_at < return_at);
        // and precedes the break inside the loop
        let break_at = out.code.find("break;").unwrap();
        let loop_call_at = out.code[..break_at].rfind("done();").unwrap();
        assert!(loop_call_at < break_at);
    }

    #[test]
    fn test_for_lowering() {
        let out = emit("main :: fn() void { for (i: i32 = 0; i < 10; i = i + 1) { } }");
        assert!(out.code.contains("i32 i = 0;"));
        assert!(out.code.contains("for (; i < 10; i = i + 1) {"));
    }

    #[test]
    fn test_compile_flags_collected() {
        let out = emit("#output \"demo\";\n#O2;\n#syslink \"m\";\n#link \"extra.o\";\nmain :: fn() void { }");
        assert_eq!(out.flags.output, "demo");
        assert_eq!(out.flags.optimisation, OptLevel::O2);
        assert_eq!(
            out.flags.links,
            vec!["-lm".to_string(), "extra.o".to_string()]
        );
    }

    #[test]
    fn test_default_flags() {
        let out = emit("main :: fn() void { }");
        assert_eq!(out.flags.optimisation, OptLevel::Debug);
        assert!(out.flags.output.is_empty());
        assert_eq!(OptLevel::Debug.cc_args(), &["-Og", "-g"]);
        assert_eq!(OptLevel::Fast.cc_args(), &["-O3"]);
        assert_eq!(OptLevel::Small.cc_args(), &["-Os"]);
    }

    #[test]
    fn test_pointer_and_deref_lowering() {
        let out = emit("main :: fn() void { x := 5; p: *i64 = &x; y := p.&; }");
        assert!(out.code.contains("i64* p = &x;"));
        assert!(out.code.contains("i64 y = *p;"));
    }

    #[test]
    fn test_field_access_through_pointer() {
        let out = emit(
            "Vec2 :: struct { x: f32; y: f32; }\n\
             f :: fn(v: *Vec2) f32 { return v.x; }\nmain :: fn() void { }",
        );
        assert!(out.defs.contains("typedef struct Vec2 Vec2;"));
        assert!(out.code.contains("return v->x;"));
    }

    #[test]
    fn test_struct_literal_lowering() {
        let out = emit(
            "Vec2 :: struct { x: f32; y: f32; }\n\
             main :: fn() void { v := Vec2{.x = 1.5, .y = 2.0}; w := v.x; }",
        );
        assert!(out.code.contains("Vec2 v = (Vec2){.x = 1.5, .y = 2.0};"));
        assert!(out.code.contains("f32 w = v.x;"));
    }

    #[test]
    fn test_compound_divide_assignment() {
        let out = emit("main :: fn() void { x := 10; x /= 2; }");
        assert!(out.code.contains("x = x / (2);"));
    }

    #[test]
    fn test_extern_prototype_only() {
        let out = emit("extern puts :: fn(s: cstring) i32;\nmain :: fn() void { puts(c\"hi\"); }");
        assert!(out.defs.contains("i32 puts(const char* s);"));
        assert!(!out.code.contains("i32 puts(const char* s) {"));
        assert!(out.code.contains("puts(\"hi\");"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let src = "Vec2 :: struct { x: f32; y: f32; }\n\
                   f :: fn(v: ?Vec2) void { }\n\
                   main :: fn(args: []string) void { a := [2]i32{1, 2}; }";
        let lexed = lex(src).unwrap();
        let mut ast = parse(&lexed).unwrap();
        let dgraph = analyse(&mut ast, &lexed.cursors).unwrap();

        let first = generate(&ast, &lexed.cursors, &dgraph).unwrap();
        let second = generate(&ast, &lexed.cursors, &dgraph).unwrap();
        assert_eq!(first.defs, second.defs);
        assert_eq!(first.code, second.code);
    }

    #[test]
    fn test_def_and_imp_pair_up() {
        let out = emit(
            "f :: fn(xs: []i32, o: ?u8) void { }\n\
             main :: fn() void { a := [4]f32{1.0, 2.0, 3.0, 4.0}; }",
        );
        assert_eq!(out.defs.matches("CurSliceDef(i32, i32);").count(), 1);
        assert_eq!(out.code.matches("CurSliceImp(i32, i32);").count(), 1);
        assert_eq!(out.defs.matches("CurOptionDef(u8, u8);").count(), 1);
        assert_eq!(out.code.matches("CurOptionImp(u8, u8);").count(), 1);
        assert_eq!(out.defs.matches("CurArray1dDef(f32, f32, 4);").count(), 1);
        assert_eq!(out.code.matches("CurArray1dImp(f32, f32, 4);").count(), 1);
    }

    #[test]
    fn test_instantiation_precedes_prototype() {
        let out = emit("f :: fn(xs: []i32) void { }\nmain :: fn() void { }");
        let def_at = out.defs.find("CurSliceDef(i32, i32);").unwrap();
        let proto_at = out.defs.find("void f(CurSlice_i32 xs);").unwrap();
        assert!(def_at < proto_at);
    }
}
