use std::env;
use std::process::ExitCode;

use content_lint::{parse_args, run, usage_text};

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.first().is_some_and(|arg| arg == "-h" || arg == "--help") {
        println!("{}", usage_text());
        return ExitCode::SUCCESS;
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{}", usage_text());
            return ExitCode::from(1);
        }
    };

    match run(&options) {
        Ok(outcome) => {
            println!("{}", outcome.report);
            for warning in &outcome.warnings {
                eprintln!("{warning}");
            }
            if options.strict && !outcome.warnings.is_empty() {
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}
