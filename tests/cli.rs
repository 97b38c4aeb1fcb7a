use classfile_tracer::opcodes::*;
use classfile_tracer::tree::ClassNode;
use classfile_tracer::writer::ClassWriter;
use classfile_tracer::*;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::process::{Command, Output};
use std::rc::Rc;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

fn run(args: &[&str], dir: &Path, java_home: Option<&Path>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_class-tracer"));
    cmd.args(args)
        .current_dir(dir)
        .env_remove("CLASSPATH")
        .env_remove("JAVA_HOME")
        .env_remove("PATH")
        .env("RUST_LOG", "error");
    if let Some(home) = java_home {
        cmd.env("JAVA_HOME", home);
    }
    cmd.output().unwrap()
}

fn runnable_class() -> Vec<u8> {
    let mut cw = ClassWriter::new();
    cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC | ClassAccess::ACC_INTERFACE | ClassAccess::ACC_ABSTRACT,
        Rc::from("java/lang/Runnable"), None, Some(Rc::from("java/lang/Object")), vec![]);
    {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC | MethodAccess::ACC_ABSTRACT,
            Rc::from("run"), Rc::from("()V"), None, vec![]).unwrap();
        mv.visit_end();
    }
    cw.visit_end();
    cw.to_bytes().unwrap()
}

///A JDK home whose `java.base.jmod` holds just `java.lang.Runnable`.
fn fake_jdk(home: &Path) {
    fs::create_dir_all(home.join("jmods")).unwrap();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("classes/java/lang/Runnable.class", FileOptions::default()).unwrap();
    zip.write_all(&runnable_class()).unwrap();
    let mut jmod = vec![0x4A, 0x4D, 0x01, 0x00];
    jmod.extend(zip.finish().unwrap().into_inner());
    fs::write(home.join("jmods/java.base.jmod"), jmod).unwrap();
}

fn hello_class() -> Vec<u8> {
    let mut cw = ClassWriter::new();
    cw.visit_header(ClassVersion::new(V1_8, 0), ClassAccess::ACC_PUBLIC | ClassAccess::ACC_SUPER,
        Rc::from("demo/Hello"), None, Some(Rc::from("java/lang/Object")), vec![]);
    {
        let mut mv = cw.visit_method(MethodAccess::ACC_PUBLIC | MethodAccess::ACC_STATIC,
            Rc::from("run"), Rc::from("()V"), None, vec![]).unwrap();
        mv.visit_code();
        mv.visit_insn(RETURN);
        mv.visit_maxs(0, 0);
        mv.visit_end();
    }
    cw.visit_end();
    cw.to_bytes().unwrap()
}

#[test]
fn instruments_class_from_classpath() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("classes/demo")).unwrap();
    fs::write(dir.path().join("classes/demo/Hello.class"), hello_class()).unwrap();

    let out = run(&["demo.Hello", "-c", "classes"], dir.path(), None);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let written = fs::read(dir.path().join("t.class")).unwrap();
    let node = ClassNode::from_bytes(&written).unwrap();
    assert_eq!(node.method("run").unwrap().opcodes(), vec![
        GETSTATIC, LDC, INVOKEVIRTUAL,
        GETSTATIC, LDC, INVOKEVIRTUAL,
        RETURN
    ]);
}

#[test]
fn default_class_comes_from_the_jdk() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    fake_jdk(home.path());

    let out = run(&[], dir.path(), Some(home.path()));
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let node = ClassNode::from_bytes(&fs::read(dir.path().join("t.class")).unwrap()).unwrap();
    assert_eq!(&*node.name, "java/lang/Runnable");
    assert!(!node.method("run").unwrap().has_code);
}

#[test]
fn classes_are_found_in_jars() {
    let dir = TempDir::new().unwrap();
    let mut zip = ZipWriter::new(fs::File::create(dir.path().join("app.jar")).unwrap());
    zip.start_file("demo/Hello.class", FileOptions::default()).unwrap();
    zip.write_all(&hello_class()).unwrap();
    zip.finish().unwrap();

    let out = run(&["demo.Hello", "-c", "app.jar", "-o", "hello.class"], dir.path(), None);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let node = ClassNode::from_bytes(&fs::read(dir.path().join("hello.class")).unwrap()).unwrap();
    assert_eq!(node.method("run").unwrap().opcodes().len(), 7);
}

#[test]
fn unknown_class_fails_both_steps() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    fake_jdk(home.path());
    let out = run(&["demo.DoesNotExist", "-o", "out.class"], dir.path(), Some(home.path()));
    assert_eq!(out.status.code(), Some(1));

    //lookup error first, then the write step reports the empty writer
    let stderr = String::from_utf8_lossy(&out.stderr);
    let lookup = stderr.find("Failed to load 'demo.DoesNotExist'").unwrap();
    assert!(stderr.contains("java.base.jmod"), "{}", stderr);
    let write = stderr.find("Failed to write 'out.class': cannot encode class").unwrap();
    assert!(lookup < write);
    assert!(!dir.path().join("out.class").exists());
}
