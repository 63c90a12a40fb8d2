use std::{
    fs,
    io::{self, Read},
};

use anyhow::{bail, Context as _};
use clap::{App, Arg};
use inkwell::context::Context;
use nexon::{lexer::Lexer, ConstructKind, Session};

fn read_source(input: Option<&str>, expr: Option<&str>) -> anyhow::Result<String> {
    if let Some(expr) = expr {
        return Ok(expr.to_string());
    }
    match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read {}", path)),
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("failed to read stdin")?;
            Ok(source)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("nexon")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("input")
                .help("source file to compile, stdin when omitted")
                .index(1),
        )
        .arg(
            Arg::with_name("expr")
                .short("e")
                .long("expr")
                .takes_value(true)
                .conflicts_with("input")
                .help("compile the given source text instead of a file"),
        )
        .arg(
            Arg::with_name("tokens")
                .long("tokens")
                .help("print the token stream and exit"),
        )
        .arg(
            Arg::with_name("emit-ir")
                .long("emit-ir")
                .help("print the generated IR"),
        )
        .arg(
            Arg::with_name("optimize")
                .short("O")
                .long("optimize")
                .help("run the optimizer over the finished module"),
        )
        .arg(
            Arg::with_name("no-run")
                .long("no-run")
                .help("do not evaluate top-level expressions"),
        )
        .get_matches();

    let source = read_source(matches.value_of("input"), matches.value_of("expr"))?;

    if matches.is_present("tokens") {
        for token in Lexer::new(&source) {
            println!("{}", token);
        }
        return Ok(());
    }

    let run = !matches.is_present("no-run");
    let context = Context::create();
    let mut session = Session::new(&context, "nexon");

    let outcomes = session.compile_with(&source, |session, compiled| {
        if run && compiled.kind == ConstructKind::TopLevelExpression {
            match session.run(&compiled.name) {
                Ok(value) => println!("{}", value),
                Err(err) => eprintln!("error: {:#}", err),
            }
        }
    });

    if matches.is_present("optimize") {
        session.optimize();
    }
    if matches.is_present("emit-ir") {
        println!("{}", session.ir());
    }

    let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
    if failed > 0 {
        bail!("{} of {} top-level constructs failed", failed, outcomes.len());
    }

    Ok(())
}
