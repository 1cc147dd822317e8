//! numhold CLI
//!
//! Binary name: `numhold`

use std::process;

use numhold::{
    cli::{build_cli, setup::init_tracing},
    commands::execute,
    output::{render, render_error_json, OutputFormat},
};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    let format = OutputFormat::from_json_flag(
        matches
            .subcommand()
            .is_some_and(|(_, sub)| sub.get_flag("json")),
    );

    if let Err(e) = init_tracing() {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Warning: {e}");
        }
    }

    let result = match execute(&matches).await {
        Ok(outcome) => render(&outcome, format),
        Err(err) => Err(err),
    };

    match result {
        Ok(text) => {
            #[allow(clippy::print_stdout)]
            {
                println!("{text}");
            }
        }
        Err(err) => {
            let core = err.downcast_ref::<numhold_core::Error>();
            let code = core.map_or(1, numhold_core::Error::exit_code);

            #[allow(clippy::print_stdout, clippy::print_stderr)]
            {
                if format.is_json() {
                    let error_code = core.map_or("ERROR", numhold_core::Error::code);
                    println!("{}", render_error_json(error_code, &format!("{err:#}")));
                } else {
                    eprintln!("Error: {err:#}");
                }
            }

            #[allow(clippy::exit)]
            process::exit(code);
        }
    }
}
