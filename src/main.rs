use std::{
    io::Read,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use mktemp::Temp;

use microcc::{
    backend::{self, CodegenOptions},
    frontend::{self, ast::pretty_print::dump_program},
    middle::{
        lir::{
            eval::{Evaluator, RuntimeValue},
            pretty_print::pretty_print_module,
        },
        lowering::lower_program,
    },
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Program tree handed over by the parser, as JSON
    input: PathBuf,

    /// Where to write the object file (or the executable with `--link`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the lowered IR
    #[arg(long)]
    emit_ir: bool,

    /// Print the generated assembly
    #[arg(long)]
    emit_asm: bool,

    /// Print the program tree before lowering
    #[arg(long)]
    dump_ast: bool,

    /// Link an executable through the system C compiler driver
    #[arg(long)]
    link: bool,

    /// Stop after lowering and printing
    #[arg(long)]
    no_object: bool,

    /// Annotate the assembly with the IR instruction each line came from
    #[arg(long)]
    debug_comments: bool,

    /// Interpret `main` instead of emitting native code, feeding stdin to
    /// `scanf`
    #[arg(long)]
    run: bool,
}

fn main() {
    let args = Args::parse();

    if !args.input.exists() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input file '{}' does not exist!", args.input.display()),
            )
            .exit()
    }

    if !args.input.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", args.input.display()),
            )
            .exit()
    }

    if args.link && args.no_object {
        Args::command()
            .error(
                ErrorKind::ArgumentConflict,
                "`--link` needs an object file, it cannot be combined with `--no-object`",
            )
            .exit()
    }

    if args
        .output
        .as_deref()
        .is_some_and(|output| is_same_file(output, &args.input))
    {
        Args::command()
            .error(
                ErrorKind::ArgumentConflict,
                "The output path would overwrite the input file!",
            )
            .exit()
    }

    /* Load the program tree */

    let contents = std::fs::read_to_string(&args.input).unwrap_or_else(|error| {
        fail(format!(
            "Error: failed to read '{}': {error}",
            args.input.display()
        ))
    });

    let program = frontend::load_program(&contents)
        .unwrap_or_else(|error| fail(format!("Error: malformed program tree: {error}")));

    if args.dump_ast {
        println!("{}", dump_program(&program));
    }

    /* Lower */

    let module_name = args
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_owned());

    let module =
        lower_program(&program, &module_name).unwrap_or_else(|error| fail(error.diagnostic()));

    if args.emit_ir {
        println!("{}", pretty_print_module(&module));
    }

    if args.run {
        let mut input = String::new();
        if let Err(error) = std::io::stdin().read_to_string(&mut input) {
            fail(format!("Error: failed to read stdin: {error}"));
        }

        let mut evaluator = Evaluator::new(&module).with_input(&input);
        let result = evaluator.call("main", &[]);

        print!("{}", evaluator.output());

        match result {
            Ok(Some(RuntimeValue::Int(status))) => std::process::exit(status),
            Ok(_) => return,
            Err(error) => fail(format!("Error: {error}")),
        }
    }

    /* Generate code */

    let options = CodegenOptions {
        emit_debug_info: args.debug_comments,
    };

    if args.emit_asm {
        match backend::translate_to_asm(&module, &options) {
            Ok(asm) => println!("{asm}"),
            Err(error) => fail(format!("Error: {error}")),
        }
    }

    if args.no_object {
        return;
    }

    let result = if args.link {
        let executable = args
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&args.input, ""));

        Temp::new_file()
            .map_err(backend::EmitError::from)
            .and_then(|object| {
                backend::emit_object(&module, object.as_path(), &options)?;
                backend::link_executable(object.as_path(), &executable)
            })
    } else {
        let object = args
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&args.input, "o"));

        backend::emit_object(&module, &object, &options)
    };

    if let Err(error) = result {
        fail(format!("Error: {error}"));
    }
}

fn fail(message: String) -> ! {
    eprintln!("{message}");
    std::process::exit(1)
}

/// `input` with its extension replaced, or with a suffix appended when that
/// would name the input itself (`sum` linked, `x.o` assembled)
fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    let candidate = input.with_extension(extension);

    if candidate != input {
        return candidate;
    }

    let suffix = if extension.is_empty() { "out" } else { extension };
    let mut name = input.as_os_str().to_owned();
    name.push(format!(".{suffix}"));

    PathBuf::from(name)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_the_extension() {
        assert_eq!(
            default_output_path(Path::new("dir/sum.json"), "o"),
            PathBuf::from("dir/sum.o")
        );
        assert_eq!(
            default_output_path(Path::new("dir/sum.json"), ""),
            PathBuf::from("dir/sum")
        );
    }

    #[test]
    fn default_output_never_names_the_input() {
        assert_eq!(
            default_output_path(Path::new("dir/sum"), ""),
            PathBuf::from("dir/sum.out")
        );
        assert_eq!(
            default_output_path(Path::new("x.o"), "o"),
            PathBuf::from("x.o.o")
        );
    }

    #[test]
    fn output_equal_to_input_is_detected() {
        assert!(is_same_file(Path::new("tree.json"), Path::new("tree.json")));
        assert!(!is_same_file(Path::new("tree.json"), Path::new("tree.o")));
    }
}
