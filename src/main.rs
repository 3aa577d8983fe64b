use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "question-detector",
    version,
    about = "Detect question regions on photographed exam pages"
)]
struct Cli {
    /// Image to analyse (reads stdin when omitted)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Run the HTTP service (optionally on ADDR instead of [server].addr)
    #[arg(long = "serve", value_name = "ADDR", num_args = 0..=1)]
    serve: Option<Option<String>>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Pretty-print the JSON result
    #[arg(short = 'p', long = "pretty")]
    pretty: bool,

    /// Write an image with the detected boxes and a JSON dump next to the input
    #[arg(long = "debug-overlay")]
    debug_overlay: bool,

    /// Print the bundled default settings and exit
    #[arg(long = "print-default-settings")]
    print_default_settings: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    question_detector::logging::init(cli.verbose, cli.log_level.as_deref())?;

    if let Some(addr) = cli.serve {
        let settings_path = cli.read_settings.as_deref().map(Path::new);
        return question_detector::serve(settings_path, addr).await;
    }

    let needs_stdin = cli.data.is_none() && !cli.print_default_settings;
    let input = if needs_stdin {
        if io::stdin().is_terminal() {
            None
        } else {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            Some(buffer)
        }
    } else {
        None
    };

    let output = question_detector::run(
        question_detector::Config {
            data: cli.data,
            settings_path: cli.read_settings,
            pretty: cli.pretty,
            debug_overlay: cli.debug_overlay,
            print_default_settings: cli.print_default_settings,
        },
        input,
    )?;

    println!("{}", output);
    Ok(())
}
