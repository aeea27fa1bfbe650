use std::process::ExitCode;

use gridsample::cli::{self, GridArgs};
use gridsample::{CancelToken, ExitStatus, GridError, listen_for_signals, report_error};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match GridArgs::from_env_args() {
        Ok(args) => args,
        Err(GridError::Help) => return ExitStatus::Help.into(),
        Err(e) => return fail_early(e),
    };

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => return fail_early(e),
    };
    let password = match args.resolve_password(&config) {
        Ok(password) => password,
        Err(e) => return fail_early(e),
    };
    let _guard = match cli::init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => return fail_early(e),
    };

    let cancel = CancelToken::new();
    let listener = match listen_for_signals(cancel.clone()) {
        Ok(listener) => listener,
        Err(e) => {
            report_error("Startup", &e);
            return e.exit_status().into();
        }
    };

    let status = match gridsample::run(&config, password, &cancel).await {
        Ok(_) => ExitStatus::Success,
        // already reported when it was noticed
        Err(GridError::Interrupted) => ExitStatus::Interrupted,
        Err(e) => {
            report_error("Fatal", &e);
            e.exit_status()
        }
    };
    listener.abort();
    status.into()
}

/// Errors found before logging is running go straight to stderr
fn fail_early(err: GridError) -> ExitCode {
    eprintln!("*** {err}");
    err.exit_status().into()
}
