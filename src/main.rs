#![recursion_limit = "128"]

#[macro_use]
extern crate combine;
extern crate clap;

mod asm;
mod codegen;
mod error;
mod eval;
mod interp;
mod parser;
mod regalloc;
mod rename;
mod syntax;
mod tc;

use asm::{Program, MAX_MEM_WORDS};
use clap::{App, Arg};
use error::*;
use regalloc::{Optimizer, RegAllocator};
use std::fs::File;
use std::io::prelude::*;
use std::io;
use std::process;
use syntax::Type;
use tracing::{info, Level};

struct Options {
    mem_size: usize,
    regalloc: bool,
    dump: bool,
    interpret: bool,
}

fn render(ty: &Type, v: i32) -> String {
    match ty {
        Type::Bool => (v != 0).to_string(),
        Type::Arrow(_, _) => "fn".to_string(),
        _ => v.to_string(),
    }
}

fn compile_and_run(code: &str, opts: &Options) -> Result<String, Error> {
    let mut exp = parser::parse(code)?;
    rename::rename(&mut exp)?;
    let ty = tc::tc(&exp)?;
    info!("program has type {}", ty);
    if opts.interpret {
        return interp::eval(&exp).map(|v| v.to_string());
    }

    let mut prog = Program::new(opts.mem_size)?;
    let answer = codegen::gen(&exp, &mut prog)?;
    if opts.dump {
        println!("-- generated code\n{}", prog);
    }

    let v = if opts.regalloc {
        let mut allocator = RegAllocator::new();
        allocator.optimize(&mut prog)?;
        if opts.dump {
            println!("-- after register allocation\n{}", prog);
        }
        prog.eval()?;
        allocator.get_val(&prog, &answer)?
    } else {
        prog.eval()?;
        prog.get_val(&answer)?
    };
    info!(pc = prog.get_pc(), "halted");
    Ok(render(&ty, v))
}

fn memory_limit(arg: &str) -> Result<usize, Error> {
    let words = arg
        .parse::<usize>()
        .map_err(|e| Error::Usage(format!("bad memory limit {}: {}", arg, e)))?;
    if words > MAX_MEM_WORDS {
        return Err(Error::Usage(format!(
            "memory limit {} is above the maximum of {} words",
            words, MAX_MEM_WORDS
        )));
    }
    Ok(words)
}

fn main_result() -> Result<String, Error> {
    let args = App::new("smlc")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("memlimit")
                .short("m")
                .long("memory-limit")
                .value_name("MEM_LIMIT")
                .default_value("1000")
                .help("Sets the machine memory in words")
                .takes_value(true),
        ).arg(
            Arg::with_name("INPUT")
                .value_name("FILENAME")
                .help("Sets the input file to use; reads standard input when absent")
                .index(1),
        ).arg(
            Arg::with_name("noregalloc")
                .long("no-regalloc")
                .help("Runs the generated code on symbolic registers"),
        ).arg(
            Arg::with_name("interpret")
                .long("interpret")
                .help("Evaluates the expression directly instead of compiling it"),
        ).arg(
            Arg::with_name("dump")
                .long("dump")
                .help("Prints the instruction listing before and after allocation"),
        ).arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Raises the log level; may be repeated"),
        ).get_matches();

    let level = match args.occurrences_of("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let mem_size = memory_limit(args.value_of("memlimit").unwrap_or("1000"))?;

    let mut buf = String::new();
    match args.value_of("INPUT") {
        Some(path) => {
            let mut file = File::open(path)?;
            file.read_to_string(&mut buf)?;
        }
        None => {
            io::stdin().read_to_string(&mut buf)?;
        }
    }

    let opts = Options {
        mem_size,
        regalloc: !args.is_present("noregalloc"),
        dump: args.is_present("dump"),
        interpret: args.is_present("interpret"),
    };
    compile_and_run(&buf[..], &opts)
}

fn main() {
    match main_result() {
        Ok(r) => println!("Answer: {}", r),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(err.exit_code())
        }
    }
}
