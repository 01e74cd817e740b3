//! escprov - Entry Point
//!
//! Provisions a Debian/Ubuntu host for the containerised Django stack and
//! manages the running application afterwards.

use std::env;

use colored::Colorize;
use tracing::{error, info};

use escprov::app::options::{AppOptions, Command, USAGE};
use escprov::app::run::{self, App};
use escprov::collect::{AnswerFilePrompter, Prompter, TerminalPrompter, Tone};
use escprov::errors::ProvisionError;
use escprov::filesys::file::File;
use escprov::logs::{init_logging, LogOptions};
use escprov::utils::version_info;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = run_cli().await;
    std::process::exit(code);
}

/// Everything that must be dropped before exiting lives in here, the log
/// guard in particular.
async fn run_cli() -> i32 {
    let options = match AppOptions::parse(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {}\n", "[ERROR]".red().bold(), e);
            eprint!("{}", USAGE);
            return 1;
        }
    };

    if options.command == Command::Version {
        return match print_version() {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{} {}", "[ERROR]".red().bold(), e);
                e.exit_code()
            }
        };
    }

    let app = match App::from_options(&options).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            return e.exit_code();
        }
    };

    let log_options = LogOptions {
        log_level: options
            .log_level
            .clone()
            .unwrap_or_else(|| app.settings.log_level.clone()),
        stdout: true,
        log_dir: Some(app.layout.host_path(&app.settings.log_dir)),
        json_format: app.settings.log_json,
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    info!(
        "escprov {} running {:?} (root {:?}, dry run: {})",
        version_info().version,
        options.command,
        app.layout.root,
        app.dry_run.is_some()
    );

    let mut prompter: Box<dyn Prompter> = match &options.answers {
        Some(path) => match AnswerFilePrompter::load(&File::new(path)).await {
            Ok(prompter) => Box::new(prompter),
            Err(e) => {
                eprintln!("{} {}", "[ERROR]".red().bold(), e);
                return e.exit_code();
            }
        },
        None => Box::new(TerminalPrompter::new()),
    };

    match dispatch(&app, &options.command, prompter.as_mut()).await {
        Ok(()) => 0,
        Err(e) => report_error(&e, prompter.as_mut()),
    }
}

async fn dispatch(
    app: &App,
    command: &Command,
    prompter: &mut dyn Prompter,
) -> Result<(), ProvisionError> {
    match command {
        Command::Install => {
            let report = run::install(app, &mut *prompter).await?;
            run::report_install(app, &report, prompter);
        }
        Command::Start => {
            let status = run::start(app).await?;
            run::report_status(&status, prompter);
        }
        Command::Stop => {
            run::stop(app).await?;
            prompter.show(Tone::Success, "Application stopped");
        }
        Command::Status => {
            let status = run::status(app).await?;
            run::report_status(&status, prompter);
        }
        Command::Logs(service) => run::logs(app, service.as_deref()).await?,
        Command::Deploy => {
            let status = run::deploy(app).await?;
            run::report_status(&status, prompter);
        }
        Command::Render(template) => print!("{}", run::render(app, template).await?),
        Command::Validate(path) => run::validate(app, path.as_deref(), prompter).await?,
        Command::Version => print_version()?,
    }
    Ok(())
}

fn print_version() -> Result<(), ProvisionError> {
    println!("{}", serde_json::to_string_pretty(&version_info())?);
    Ok(())
}

fn report_error(err: &ProvisionError, prompter: &mut dyn Prompter) -> i32 {
    if let ProvisionError::Cancelled = err {
        info!("Cancelled by operator");
        prompter.warn("Cancelled, no changes were made");
        return err.exit_code();
    }

    error!("{}", err);
    prompter.show(Tone::Error, &err.to_string());
    if let Some(output) = err.output() {
        prompter.show(Tone::Info, &output.dimmed().to_string());
    }
    err.exit_code()
}
