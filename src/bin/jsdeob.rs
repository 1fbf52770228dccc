use js_deobfuscate_rs::{deobfuscate_with, BoaSandbox, Options, Sandbox};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct CliArgs {
    input: String,
    output: Option<PathBuf>,
    options: Options,
    no_sandbox: bool,
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let cli = parse_args(&args[1..])?;

    let code = if cli.input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(&cli.input)?
    };

    let sandbox;
    let sandbox_ref: Option<&dyn Sandbox> = if cli.no_sandbox {
        None
    } else {
        sandbox = BoaSandbox::with_timeout(cli.options.sandbox_timeout);
        Some(&sandbox)
    };

    let result = deobfuscate_with(&code, &cli.options, sandbox_ref)?;
    eprintln!("[CLI] {} edit(s)", result.changes);

    match &cli.output {
        Some(path) => fs::write(path, &result.code)?,
        None => print!("{}", result.code),
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<CliArgs, Box<dyn std::error::Error>> {
    let mut input = None;
    let mut output = None;
    let mut options = Options::default();
    let mut no_sandbox = false;

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let mut value = |i: &mut usize| -> Result<String, Box<dyn std::error::Error>> {
            *i += 1;
            args.get(*i)
                .cloned()
                .ok_or_else(|| format!("{} expects a value", arg).into())
        };

        match arg.as_str() {
            "-o" | "--output" => output = Some(PathBuf::from(value(&mut i)?)),
            "--decoder" => options.decoders.push(value(&mut i)?),
            "--mark" => options.mark_keywords.push(value(&mut i)?),
            "--call-count-threshold" => options.call_count_threshold = value(&mut i)?.parse()?,
            "--array-size-threshold" => options.array_size_threshold = value(&mut i)?.parse()?,
            "--iteration-cap" => options.iteration_cap = value(&mut i)?.parse()?,
            "--proxy-depth" => options.proxy_depth = value(&mut i)?.parse()?,
            "--sandbox-timeout" => {
                options.sandbox_timeout = Duration::from_secs(value(&mut i)?.parse()?);
            }
            "--keep-top-level" => options.keep_program_scope_vars = true,
            "--rename" => options.rename_vars = true,
            "--no-sandbox" => no_sandbox = true,
            "-h" | "--help" => {
                print_usage("jsdeob");
                std::process::exit(0);
            }
            other if input.is_none() && (!other.starts_with('-') || other == "-") => {
                input = Some(other.to_string());
            }
            other => return Err(format!("unknown option: {}", other).into()),
        }
        i += 1;
    }

    let input = input.ok_or("no input file given (use - for stdin)")?;
    Ok(CliArgs {
        input,
        output,
        options,
        no_sandbox,
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <input.js | -> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <file>             write output to a file instead of stdout");
    eprintln!("      --decoder <name>            force a function name into the decoder set (repeatable)");
    eprintln!("      --mark <keyword>            add a TOLOOK mark on lines containing <keyword> (repeatable)");
    eprintln!("      --call-count-threshold <n>  reference count that classifies a decoder (default 100)");
    eprintln!("      --array-size-threshold <n>  element count that classifies a string table (default 100)");
    eprintln!("      --iteration-cap <n>         maximum fixpoint iterations (default 20)");
    eprintln!("      --proxy-depth <n>           wrapper-collapse rounds (default 2)");
    eprintln!("      --sandbox-timeout <secs>    sandbox wall-clock limit (default 10)");
    eprintln!("      --keep-top-level            keep unused top-level declarations");
    eprintln!("      --rename                    rename residual _0x names to var_N / func_N");
    eprintln!("      --no-sandbox                refuse to execute decoder code");
}
