mod test_runner;

use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use directive::{Script, ScriptRun};

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

#[derive(Parser)]
#[command(name = "vpcheck", version, about = "Directive argument checker")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a directive script
    Run(RunArgs),

    /// Run .test.toml conformance files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// TOML directive script to execute
    file: String,

    /// Load only, don't run (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// List the declared directives and their flags
    #[arg(long)]
    list_directives: bool,

    /// Print the symbol table after the run
    #[arg(long)]
    symbols: bool,

    /// Suppress handler output (just check for errors)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.toml file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    env_logger::Builder::from_default_env().init();

    // `vpcheck file.toml` works like `vpcheck run file.toml`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().skip(1).position(|a| !a.starts_with('-')) {
        if !SUBCOMMANDS.contains(&args[pos + 1].as_str()) {
            args.insert(pos + 1, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::print_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            process::exit(1);
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let script = match source.parse::<Script>() {
        Ok(s) => s,
        Err(error) => {
            emit(&writer, &config, &files, &error.to_diagnostic(file_id));
            process::exit(1);
        }
    };
    log::info!(
        "loaded {} directive(s) and {} call(s) from {}",
        script.directives.len(),
        script.calls.len(),
        args.file
    );

    if args.check {
        eprintln!("ok: {} loaded successfully", args.file);
        return;
    }

    if args.list_directives {
        for decl in &script.directives {
            let flags = decl
                .directive_flags()
                .map(|f| f.to_string())
                .unwrap_or_default();
            let resolve = if decl.resolve { " (resolve)" } else { "" };
            println!("{} {}{}", decl.name(), flags, resolve);
        }
        return;
    }

    let result = if args.quiet {
        let mut sink = std::io::sink();
        directive::run_script(&script, &mut sink, file_id)
    } else {
        let mut stdout = std::io::stdout();
        directive::run_script(&script, &mut stdout, file_id)
    };

    let run = match result {
        Ok(run) => run,
        Err(error) => {
            emit(&writer, &config, &files, &error.to_diagnostic(file_id));
            process::exit(1);
        }
    };

    for diag in &run.diagnostics {
        emit(&writer, &config, &files, &diag.to_diagnostic());
    }

    if args.symbols {
        print_symbols(&run);
    }

    if run.has_errors() {
        process::exit(1);
    }
}

fn emit(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostic: &Diagnostic<usize>,
) {
    let _ = term::emit_to_write_style(&mut writer.lock(), config, files, diagnostic);
}

fn print_symbols(run: &ScriptRun) {
    for (_, sym) in run.symtab.iter() {
        let first = sym
            .first_use_line()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{} {} {}", sym.name(), first, sym.use_lines().len());
    }
}
