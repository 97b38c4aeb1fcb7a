use classfile_tracer::classpath::ClassPath;
use classfile_tracer::instrument::{instrument_into, LabelStyle, TraceConfig, TraceTarget};
use classfile_tracer::writer::ClassWriter;
use classfile_tracer::Error;

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::path::{Path, PathBuf};
use std::process;

const DEFAULT_CLASS: &str = "java.lang.Runnable";

fn load(classpath: &ClassPath, name: &str, config: &TraceConfig, writer: &mut ClassWriter) -> Result<(), Error> {
    log::info!("Reading and instrumenting '{}'", name);
    let bytes = classpath.find(name)?;
    instrument_into(&bytes, config, writer)?;
    Ok(())
}

fn report(class: &str, output: &Path, e: &Error) {
    if e.is_lookup() {
        log::error!("Failed to load '{}': {}", class, e);
    } else {
        log::error!("Failed to write '{}': {}", output.display(), e);
    }
}

fn main() {
    env_logger::init();

    let matches = Command::new("class-tracer")
        .version(crate_version!())
        .about("Adds entry and exit trace output to every method of a JVM class")
        .arg(
            Arg::new("CLASS")
                .help("Fully qualified name of the class to instrument")
                .default_value(DEFAULT_CLASS)
                .index(1),
        )
        .arg(
            Arg::new("classpath")
                .short('c')
                .long("classpath")
                .value_name("PATH")
                .help("Directory, jar or jmod to search for the class; defaults to CLASSPATH or the current directory")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .default_value("t.class")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("stderr")
                .long("stderr")
                .help("Print the traces to System.err")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("qualified labels")
                .long("qualified-labels")
                .help("Append the owner, name and descriptor of the method to each trace")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let class = matches.get_one::<String>("CLASS").map(String::as_str).unwrap_or(DEFAULT_CLASS);
    let output = matches.get_one::<PathBuf>("output").cloned().unwrap_or_else(|| PathBuf::from("t.class"));
    let classpath = match matches.get_many::<PathBuf>("classpath") {
        Some(dirs) => ClassPath::new(dirs.cloned().collect()).with_system_runtime(),
        None => ClassPath::from_env(),
    };
    let mut config = TraceConfig::default();
    if matches.get_flag("stderr") {
        config.target = TraceTarget::stderr();
    }
    if matches.get_flag("qualified labels") {
        config.style = LabelStyle::Qualified;
    }

    let mut writer = ClassWriter::new();
    let mut failed = false;
    if let Err(e) = load(&classpath, class, &config, &mut writer) {
        report(class, &output, &e);
        failed = true;
    }
    log::info!("Writing '{}'", output.display());
    if let Err(e) = writer.save_to_path(&output) {
        report(class, &output, &e);
        failed = true;
    }
    if failed {
        process::exit(1);
    }
}
