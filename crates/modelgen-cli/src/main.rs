//! The `modelgen` command-line front end.
//!
//! Runs source files (and/or stdin) in order inside one interpreter
//! instance, then optionally exports the emitted geometry. `--tokens` and
//! `--ast` dump the front-end stages and exit without evaluating.

use std::env;
use std::fs;
use std::io::{Read, Write};
use std::process::ExitCode;
use std::time::Instant;

use modelgen::{
    dump_instance, dump_node, dump_tokens, export_obj, export_triangles, parse, tokenize,
    Instance,
};

const USAGE: &str = "\
Usage: modelgen [options] [--] [files]

    -h, --help        Print this help message and exit
    --version         Print ModelGen version and exit
    --export=<format> Export model to stdout in the given format
    --export <file>   Export model to <file> in the detected format
    - --stdin         Read stdin as a file
    --tokens          Print tokens and exit
    --ast             Print ast and exit
    --set <name> <value>
                      Bind name to a string value before running

Formats:

    obj       Wavefront .obj format
    triangles Tightly packed triangles 32-bit floats
              Format: xyz nxnynz (interleaved vertices)

Introspection:

    --profile Print elapsed time
    --inspect Print modules and their contents on exit

Debugging:

    --debug-read  Print file contents and exit
";

#[derive(Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Obj,
    Triangles,
}

#[derive(Default)]
struct Options {
    run_stdin: bool,
    debug_read: bool,
    debug_tokens: bool,
    debug_ast: bool,
    profile: bool,
    inspect: bool,
    export: Option<ExportFormat>,
    export_filename: Option<String>,
    sets: Vec<(String, String)>,
    files: Vec<String>,
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut index = 0;

    while index < args.len() {
        let arg = &args[index];
        match arg.as_str() {
            "--version" => {
                let (major, minor, patch) = modelgen_version();
                println!("ModelGen {major}.{minor}.{patch}");
                std::process::exit(0);
            }
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            "-" | "--stdin" => options.run_stdin = true,
            "--tokens" => options.debug_tokens = true,
            "--ast" => options.debug_ast = true,
            "--debug-read" => options.debug_read = true,
            "--profile" => options.profile = true,
            "--inspect" => options.inspect = true,
            "--set" => {
                let name = args
                    .get(index + 1)
                    .ok_or("Missing name after --set")?
                    .clone();
                let value = args
                    .get(index + 2)
                    .ok_or_else(|| format!("Missing value after --set \"{name}\""))?
                    .clone();
                options.sets.push((name, value));
                index += 2;
            }
            "--export" => {
                let filename = args
                    .get(index + 1)
                    .ok_or("Missing filename after --export")?
                    .clone();
                let extension = filename
                    .rsplit('.')
                    .next()
                    .filter(|ext| *ext != filename)
                    .ok_or_else(|| format!("Missing file extension \"{filename}\""))?;
                options.export = Some(parse_format(extension)?);
                options.export_filename = Some(filename);
                index += 1;
            }
            "--" => {
                options.files.extend(args[index + 1..].iter().cloned());
                break;
            }
            _ if arg.starts_with("--export=") => {
                options.export = Some(parse_format(&arg["--export=".len()..])?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option: {arg}"));
            }
            _ => {
                options.files.extend(args[index..].iter().cloned());
                break;
            }
        }
        index += 1;
    }

    Ok(options)
}

fn parse_format(name: &str) -> Result<ExportFormat, String> {
    match name {
        "obj" => Ok(ExportFormat::Obj),
        "triangles" => Ok(ExportFormat::Triangles),
        other => Err(format!("Unknown format \"{other}\"")),
    }
}

fn modelgen_version() -> (u32, u32, u32) {
    let mut parts = env!("CARGO_PKG_VERSION").splitn(3, '.');
    let mut next = || parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (next(), next(), next())
}

fn read_stdin() -> Result<String, String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|err| format!("Error reading stdin: {err}"))?;
    Ok(text)
}

fn read_file(filename: &str) -> Result<String, String> {
    fs::read_to_string(filename).map_err(|err| format!("Error reading \"{filename}\": {err}"))
}

/// Collects each requested source as `(name, text)`.
fn collect_sources(options: &Options) -> Result<Vec<(String, String)>, String> {
    let mut sources = Vec::new();
    if options.run_stdin {
        sources.push(("<stdin>".to_owned(), read_stdin()?));
    }
    for filename in &options.files {
        sources.push((filename.clone(), read_file(filename)?));
    }
    Ok(sources)
}

fn dump_front_end(options: &Options) -> Result<(), String> {
    for (name, text) in collect_sources(options)? {
        if options.debug_read {
            print!("{text}");
            continue;
        }
        let tokens = tokenize(&text, &name).map_err(|err| err.to_string())?;
        if options.debug_tokens {
            print!("{}", dump_tokens(&text, &tokens, &name));
        } else {
            let root = parse(&tokens, &name).map_err(|err| err.to_string())?;
            print!("{}", dump_node(&root, &text, &tokens));
        }
    }
    Ok(())
}

fn run(options: &Options) -> Result<(), String> {
    let mut instance = Instance::new();
    for (name, value) in &options.sets {
        instance.set_base_string(name, value);
    }

    if options.run_stdin {
        let text = read_stdin()?;
        instance
            .run_source(&text, "<stdin>")
            .map_err(|err| err.to_string())?;
    }
    for filename in &options.files {
        instance.run_file(filename).map_err(|err| err.to_string())?;
    }

    if options.inspect {
        println!();
        print!("{}", dump_instance(&instance));
    }

    if let Some(format) = options.export {
        let result = match &options.export_filename {
            Some(filename) => {
                let mut file = fs::File::create(filename)
                    .map_err(|err| format!("Failed opening file \"{filename}\": {err}"))?;
                export(&instance, format, &mut file)
            }
            None => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                export(&instance, format, &mut lock)
            }
        };
        result.map_err(|err| err.to_string())?;
    }

    Ok(())
}

fn export(
    instance: &Instance,
    format: ExportFormat,
    out: &mut dyn Write,
) -> Result<(), modelgen::Error> {
    match format {
        ExportFormat::Obj => export_obj(instance, out),
        ExportFormat::Triangles => export_triangles(instance, out),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let options = match parse_options(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let result = if options.debug_read || options.debug_tokens || options.debug_ast {
        dump_front_end(&options)
    } else {
        run(&options)
    };

    if options.profile {
        let elapsed = start.elapsed();
        eprintln!("Time Elapsed: {:.6}ms", elapsed.as_secs_f64() * 1000.0);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
