use anyhow::{bail, Context};
use clap::{crate_version, Arg, ArgAction, Command};

use iomlc::{codegen, gen, lex::Lexer, parse, quad::QuadProgram};

use std::fs::File;
use std::io::{BufWriter, Write};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Command::new("iomlc")
        .version(crate_version!())
        .about("IOML state machine compiler")
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("FILE")
                .help("IOML source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("dump-ast")
                .long("dump-ast")
                .action(ArgAction::SetTrue)
                .help("Print the reduced AST instead of compiling"),
        )
        .arg(
            Arg::new("dump-ir")
                .long("dump-ir")
                .action(ArgAction::SetTrue)
                .help("Print the quadruple IR instead of compiling"),
        )
        .get_matches();

    let input = args.get_one::<String>("input").unwrap();
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read source file: {}", input))?;

    let tokens = match Lexer::new(&source, input.as_str()).try_exhaustive() {
        Ok(tokens) => tokens,
        Err(errors) => {
            for error in &errors {
                eprintln!("error: {}", error);
            }
            bail!("build failed with {} lexical errors", errors.len());
        }
    };

    let mut unit = match parse::parse(input.as_str(), tokens) {
        Ok(unit) => unit,
        Err(error) => {
            eprintln!("error: {}", error);
            bail!("build failed");
        }
    };

    if let Err(error) = unit.fix() {
        eprintln!("error: {}", error);
        bail!("build failed");
    }

    unit.reduce();

    if args.get_flag("dump-ast") {
        print!("{}", unit);
        return Ok(());
    }

    if args.get_flag("dump-ir") {
        for auto in &unit.autos {
            let mut prog = QuadProgram::new();
            gen::generate(auto, &unit.symbols, &mut prog);

            println!("; {}", auto.name);
            for quad in prog.quads() {
                println!("{}", quad);
            }
        }
        return Ok(());
    }

    match args.get_one::<String>("output").unwrap().as_str() {
        "-" => {
            let stdout = std::io::stdout();
            codegen::emit(&unit, &mut stdout.lock()).context("Failed to emit to stdout")?;
        }

        path => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            let mut writer = BufWriter::new(file);
            codegen::emit(&unit, &mut writer)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
            writer.flush()?;
        }
    }

    Ok(())
}
