//! Main entry point for the apgbuild CLI app

use apgbuild::cli_runner::{self, Outcome};

fn main() -> std::process::ExitCode {
    match cli_runner::run_cli_app() {
        Ok(Outcome::Success) => std::process::ExitCode::SUCCESS,
        Ok(Outcome::Failed) => std::process::ExitCode::FAILURE,
        Err(e) => {
            match e.downcast_ref::<clap::Error>() {
                Some(clap_err) => {
                    let _ = clap_err.print();
                    if !clap_err.use_stderr() {
                        return std::process::ExitCode::SUCCESS;
                    }
                }
                None => eprintln!("Error: {}", e),
            }
            std::process::ExitCode::FAILURE
        }
    }
}
