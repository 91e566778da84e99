#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use hostscript::diagnostics::codes;
use hostscript::host::{catalog, HostTypeKind, TypeSig};
use hostscript::imports::ImportOutcome;
use hostscript::options::{Resource, ResourceData};
use hostscript::persist;
use hostscript::{
    CompilationOptions, HostModule, HostType, ScriptBuilder, Session, SessionError, StartOptions, TargetKind, Value,
};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_stdlib() -> CompilationOptions {
    CompilationOptions {
        load_default_library: true,
        ..CompilationOptions::default()
    }
}

fn executable() -> CompilationOptions {
    CompilationOptions {
        target: TargetKind::Executable,
        ..with_stdlib()
    }
}

fn codes_of(session_output: &hostscript::BuildOutput) -> Vec<u32> {
    session_output.module.diagnostics().iter().map(|d| d.code).collect()
}

const GREETER: &str = "using System;
public class Greeter {
    public static fn Greet(name: string) -> string { return \"Hello, \" + name; }
    public static fn Main() { Console.WriteLine(Greeter.Greet(\"world\")); }
}";

#[test]
fn no_sources_is_reported() {
    let out = Session::start(StartOptions::default()).build();
    assert!(!out.success);
    assert_eq!(codes_of(&out), vec![codes::NO_SOURCES]);
    assert!(out.module.types().is_empty());
}

#[test]
fn a_console_program_compiles_to_one_type() {
    let mut builder = ScriptBuilder::new();
    builder.start(StartOptions::new(with_stdlib()));
    builder.add_from_text("greeter.hs", GREETER).unwrap();
    let out = builder.build().unwrap();

    assert!(out.success, "{:?}", out.module.diagnostics());
    assert_eq!(out.module.error_count(), 0);
    let types = out.module.types();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name(), "Greeter");
    assert_eq!(
        types[0].invoke_static("Greet", vec![Value::str("you")]).unwrap(),
        Value::str("Hello, you")
    );
}

#[test]
fn an_undeclared_name_fails_the_build() {
    let mut builder = ScriptBuilder::new();
    builder.start(StartOptions::default());
    builder
        .add_from_text("broken.hs", "public class T { public static fn Run() { Foo.Bar(); } }")
        .unwrap();
    let out = builder.build().unwrap();

    assert!(!out.success);
    assert!(out.module.error_count() >= 1);
    assert!(out.module.types().is_empty());
    assert!(!out.module.is_loaded());
    let first = &out.module.diagnostics()[0];
    assert_eq!(first.file.as_deref(), Some("broken.hs"));
    assert_eq!(first.line, 1);
}

#[test]
fn restarting_discards_earlier_sources() {
    let mut builder = ScriptBuilder::new();
    builder.start(StartOptions::default());
    builder.add_from_text("a.hs", "public class A { }").unwrap();
    builder.start(StartOptions::default());
    builder.add_from_text("b.hs", "public class B { }").unwrap();
    let out = builder.build().unwrap();

    assert!(out.success);
    let names: Vec<String> = out.module.types().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["B"]);
}

#[test]
fn warnings_as_errors_flips_success() {
    let src = "public class W { public static fn Run() { let unused = 1; } }";

    let mut lenient = Session::start(StartOptions::default());
    lenient.add_from_text("w.hs", src);
    let out = lenient.build();
    assert!(out.success);
    assert_eq!(out.module.warning_count(), 1);
    assert_eq!(out.module.error_count(), 0);
    assert!(out.module.diagnostics()[0].is_warning);

    let mut strict = Session::start(StartOptions::new(CompilationOptions {
        warnings_as_errors: true,
        ..CompilationOptions::default()
    }));
    strict.add_from_text("w.hs", src);
    let out = strict.build();
    assert!(!out.success);
    assert_eq!(out.module.warning_count(), 0);
    assert_eq!(out.module.error_count(), 1);
    assert_eq!(codes_of(&out), vec![codes::UNUSED_VARIABLE]);
    assert!(out.module.types().is_empty());
}

#[test]
fn an_executable_stream_is_rejected_once() {
    let mut session = Session::start(StartOptions::default());
    session.add_from_stream("tool.hs", || {
        Ok(Box::new(Cursor::new(b"MZ\x90\x00\x03\x00".to_vec())) as Box<dyn Read + Send>)
    });
    let out = session.build();
    assert!(!out.success);
    assert_eq!(codes_of(&out), vec![codes::BINARY_SOURCE]);
}

#[test]
fn file_sources_are_read_at_build_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.hs");

    let mut session = Session::start(StartOptions::default());
    session.add_from_file(&path);
    std::fs::write(&path, "public class Late { }").unwrap();
    let out = session.build();

    assert!(out.success, "{:?}", out.module.diagnostics());
    assert_eq!(out.module.types()[0].name(), "Late");
}

#[test]
fn persisted_and_in_memory_builds_agree() {
    let dir = tempfile::tempdir().unwrap();
    let build = |options: CompilationOptions| {
        let mut session = Session::start(StartOptions::new(options));
        session.add_from_text("calc.hs", GREETER);
        session.build()
    };

    let in_memory = build(with_stdlib());
    let persisted = build(CompilationOptions {
        in_memory: false,
        output_dir: dir.path().to_path_buf(),
        ..with_stdlib()
    });

    assert!(in_memory.success && persisted.success);
    let names = |out: &hostscript::BuildOutput| {
        out.module
            .types()
            .iter()
            .map(|t| t.full_name().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&in_memory), names(&persisted));
    assert_eq!(in_memory.module.error_count(), persisted.module.error_count());
    assert_eq!(in_memory.module.warning_count(), persisted.module.warning_count());

    let image = persist::load_image(&dir.path().join("calc.lib")).unwrap();
    assert_eq!(image.name, "calc");
    assert_eq!(image.types.len(), 1);
}

#[test]
fn importing_twice_is_a_no_op() {
    let widget = HostType::builder("Widget").namespace("Ui").build();
    let mut builder = ScriptBuilder::new();
    builder.start(StartOptions::default());
    let before = builder.import_type(&widget).unwrap();
    let again = builder.import_type(&widget).unwrap();
    assert_eq!(before, ImportOutcome::Imported);
    assert_eq!(again, ImportOutcome::AlreadyImported);

    let hidden = HostType::builder("Hidden").internal().build();
    assert_eq!(builder.import_type(&hidden).unwrap(), ImportOutcome::NotPublic);
}

#[test]
fn main_runs_with_captured_output() {
    let mut session = Session::start(StartOptions::new(executable()));
    session.add_from_text("greeter.hs", GREETER);
    let out = session.build();
    assert!(out.success, "{:?}", out.module.diagnostics());
    assert!(out.module.entry_point().is_some());

    let capture = Capture::default();
    out.module.redirect_output(capture.clone());
    assert_eq!(out.module.run_main().unwrap(), Value::Null);
    assert_eq!(capture.text(), "Hello, world\n");
}

#[test]
fn executables_need_a_main() {
    let mut session = Session::start(StartOptions::new(executable()));
    session.add_from_text("lib.hs", "public class NoMain { }");
    let out = session.build();
    assert!(!out.success);
    assert_eq!(codes_of(&out), vec![codes::ENTRY_POINT_MISSING]);
}

fn message_module(name: &str) -> HostModule {
    HostModule::new(
        name,
        vec![HostType::builder("MyStruct")
            .namespace(name)
            .kind(HostTypeKind::Struct)
            .field("Message", TypeSig::String)
            .constructor(vec![], |_| Ok(Value::Null))
            .method("ToString", vec![], TypeSig::String, |call| call.this_field("Message"))],
    )
}

#[test]
fn host_structs_take_object_initializers() {
    let module = message_module("Messages");
    let mut builder = ScriptBuilder::new();
    builder.start(StartOptions::new(executable()));
    builder.import_module(&module).unwrap();
    builder
        .add_from_text(
            "program.hs",
            "using System;
             using Messages;
             public class Program {
                 public static fn Main() {
                     let s = new MyStruct { Message = \"from the host\" };
                     Console.WriteLine(s);
                     Console.WriteLine(s.Message);
                 }
             }",
        )
        .unwrap();
    let out = builder.build().unwrap();
    assert!(out.success, "{:?}", out.module.diagnostics());

    let capture = Capture::default();
    out.module.redirect_output(capture.clone());
    out.module.run_main().unwrap();
    assert_eq!(capture.text(), "from the host\nfrom the host\n");
}

#[test]
fn catalog_modules_resolve_through_references() {
    catalog::register(message_module("Referenced"));
    let mut session = Session::start(StartOptions::new(CompilationOptions {
        references: vec!["Referenced".into()],
        ..CompilationOptions::default()
    }));
    session.add_from_text(
        "r.hs",
        "using Referenced;
         public class R { public static fn Make() -> string { let s = new MyStruct { Message = \"ok\" }; return s.Message; } }",
    );
    let out = session.build();
    assert!(out.success, "{:?}", out.module.diagnostics());
    assert_eq!(
        out.module.find_type("R").unwrap().invoke_static("Make", vec![]).unwrap(),
        Value::str("ok")
    );
}

#[test]
fn namespaces_import_from_the_catalog() {
    catalog::register(message_module("ByNamespace"));
    let mut builder = ScriptBuilder::new();
    builder.start(StartOptions::default());
    assert_eq!(builder.import_namespace("ByNamespace").unwrap(), 1);
    assert_eq!(builder.import_namespace("ByNamespace").unwrap(), 0);
    builder
        .add_from_text("n.hs", "using ByNamespace; public class N { let s: MyStruct; }")
        .unwrap();
    assert!(builder.build().unwrap().success);
}

#[test]
fn unknown_references_are_reported() {
    let mut session = Session::start(StartOptions::new(CompilationOptions {
        references: vec!["NotRegistered".into()],
        ..CompilationOptions::default()
    }));
    session.add_from_text("a.hs", "public class A { }");
    let out = session.build();
    assert!(!out.success);
    assert_eq!(codes_of(&out), vec![codes::REFERENCE_NOT_FOUND]);
}

#[test]
fn the_builder_is_single_use() {
    let mut builder = ScriptBuilder::new();
    assert_eq!(builder.build().unwrap_err(), SessionError::NotStarted);
    builder.start(StartOptions::default());
    builder.add_from_text("a.hs", "public class A { }").unwrap();
    builder.build().unwrap();
    assert_eq!(
        builder.add_from_text("b.hs", "public class B { }"),
        Err(SessionError::AlreadyBuilt)
    );
}

#[test]
fn types_span_every_unit_and_skip_nested_ones() {
    let mut session = Session::start(StartOptions::default());
    session.add_from_text(
        "a.hs",
        "namespace N {
             public class A {
                 public class Inner { }
                 public static fn Seven() -> int { return 7; }
             }
         }",
    );
    session.add_from_text(
        "b.hs",
        "using N;
         public class B { public static fn Count() -> int { return A.Seven() + 1; } }
         struct P { public let x: int; }",
    );
    let out = session.build();
    assert!(out.success, "{:?}", out.module.diagnostics());

    let names: Vec<String> = out.module.types().iter().map(|t| t.full_name().to_string()).collect();
    assert_eq!(names, vec!["N.A", "B", "P"]);
    assert!(!out.module.find_type("P").unwrap().is_public());
    assert!(out.module.find_type("N.A.Inner").is_some());
    assert_eq!(
        out.module.find_type("B").unwrap().invoke_static("Count", vec![]).unwrap(),
        Value::Int(8)
    );
}

#[test]
fn deeply_nested_sources_fail_cleanly() {
    let parens = format!(
        "public class D {{ public static fn F() -> int {{ return {}1{}; }} }}",
        "(".repeat(10_000),
        ")".repeat(10_000)
    );
    let blocks = format!(
        "public class D {{ public static fn F() {{ {}{} }} }}",
        "{".repeat(10_000),
        "}".repeat(10_000)
    );
    for src in [parens, blocks] {
        let mut session = Session::start(StartOptions::default());
        session.add_from_text("deep.hs", src);
        let out = session.build();
        assert!(!out.success);
        assert!(codes_of(&out).contains(&codes::TOO_COMPLEX));
        assert!(out.module.types().is_empty());
    }
}

#[test]
fn failed_persisted_builds_leave_no_image() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = CompilationOptions {
        in_memory: false,
        output_dir: dir.path().to_path_buf(),
        ..CompilationOptions::default()
    };
    options.resources.push(Resource {
        name: "logo".into(),
        data: ResourceData::File {
            path: dir.path().join("logo.png"),
        },
    });
    let mut session = Session::start(StartOptions::new(options));
    session.add_from_text("app.hs", "public class App { }");
    let out = session.build();

    assert!(!out.success);
    assert_eq!(codes_of(&out), vec![codes::RESOURCE_UNREADABLE]);
    assert!(!dir.path().join("app.lib").exists());
}

#[test]
fn host_field_slots_are_bounded() {
    let wide = (0..70_000)
        .fold(HostType::builder("Wide").namespace("Big"), |b, i| b.field(format!("F{i}"), TypeSig::Int))
        .kind(HostTypeKind::Struct)
        .constructor(vec![], |_| Ok(Value::Null))
        .build();
    let mut session = Session::start(StartOptions::default());
    session.import_type(&wide);
    session.add_from_text(
        "w.hs",
        "using Big; public class U { public static fn Run() -> int { let w = new Wide { F69999 = 1 }; return w.F1; } }",
    );
    let out = session.build();
    assert!(!out.success);
    assert!(codes_of(&out).contains(&codes::SLOT_LIMIT));
}

