pub mod commands;

use anyhow::bail;

pub fn run(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        print_usage();
        bail!("No command provided");
    }

    match args[0].as_str() {
        "select" => commands::select::execute(&args[1..]),
        "report" => commands::report::execute(&args[1..]),
        "schema" => commands::schema::execute(&args[1..]),
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        "-v" | "--version" => {
            print_version();
            Ok(())
        }
        _ => {
            eprintln!("Error: Unknown command '{}'", args[0]);
            print_usage();
            bail!("Unknown command: {}", args[0])
        }
    }
}

fn print_usage() {
    println!("Cukeflow - Gherkin scenario selection and cucumber JSON reporting");
    println!();
    println!("USAGE:");
    println!("    cukeflow <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    select    List the scenarios a feature file or directory would run");
    println!("    report    Compile a recorded event log into cucumber JSON");
    println!("    schema    Print the cucumber JSON report schema");
    println!("    help      Print this help message");
    println!();
    println!("OPTIONS:");
    println!("    --tags <EXPR>      Tag expression (overrides TAGS)");
    println!("    --events <FILE>    Event log in JSON lines (report)");
    println!("    --config <FILE>    Harness config file (report)");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version information");
}

fn print_version() {
    println!("cukeflow {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_missing_commands_fail() {
        assert!(run(&[]).is_err());
        assert!(run(&["frobnicate".to_string()]).is_err());
        assert!(run(&["--version".to_string()]).is_ok());
    }
}
