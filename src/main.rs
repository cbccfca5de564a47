use std::fs;
use std::io::{self, Read};

use anyhow::{Context as _, Result, bail};
use minipy::interpreter::{Context, Interpreter, StreamContext};
use minipy::lexer::Lexer;
use minipy::parser::Parser;
use minipy::runtime::Value;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input_path = args.next();
    if args.next().is_some() {
        bail!("Only one input file is supported");
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let lexer = Lexer::new(&source)?;
    let program = Parser::new(lexer).parse_program()?;

    let stdout = io::stdout();
    let mut context = StreamContext::new(stdout.lock());
    let interpreter = Interpreter::new();
    let result = interpreter.run(&program, &mut context)?;
    if !matches!(result, Value::None) {
        // A top-level return with a value gets dumped after the output.
        let rendered = interpreter.render(&result, &mut context)?;
        context.write("\n").context("Writing result")?;
        context.write(&rendered).context("Writing result")?;
    }
    Ok(())
}
