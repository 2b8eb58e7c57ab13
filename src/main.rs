//! Main entry point for the reproarch CLI app

fn main() -> std::process::ExitCode {
    if let Err(e) = reproarch::cli_runner::run_cli_app() {
        match e.downcast_ref::<clap::Error>() {
            // --help and --version also arrive here
            Some(clap_err) => {
                let _ = clap_err.print();
                if !clap_err.use_stderr() {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            None => eprintln!("Error: {}", e),
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}
