use clap::Parser;
use color_eyre::eyre::{Context, bail};
use lognote::app::App;
use lognote::cli::Cli;
use lognote::config::Config;
use lognote::engine::{Command, Engine};
use lognote::group::Selection;
use lognote::logging;
use lognote::viewport::TextSink;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();
    if let Some(log_file) = &args.log_file {
        logging::init(log_file)?;
    }

    let mut config = Config::load(&args.config);
    args.apply_to(&mut config);
    let path = args.resolve_path(&config)?;

    if args.dump || args.export {
        return print_once(path, &config, args.export).await;
    }

    let app = App::new(path, &config)?;
    let terminal = ratatui::init();
    let result = app.run(terminal).await;

    ratatui::restore();
    result
}

/// Loads the file once and prints either the display list or the
/// notification export to stdout.
async fn print_once(path: PathBuf, config: &Config, export: bool) -> color_eyre::Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut engine = Engine::new(path, config, events_tx)?;
    engine.reload();

    while let Some(event) = events_rx.recv().await {
        engine.handle_event(event);
        let status = engine.status();
        if let Some(error) = &status.load_error {
            bail!("Failed to load {}: {}", engine.path().display(), error);
        }
        if !status.loading && !status.filtering {
            break;
        }
    }

    let stdout = io::stdout().lock();
    if export {
        let batch = engine.dispatch(Command::Export(Selection::All))?;
        let mut out = io::BufWriter::new(stdout);
        serde_json::to_writer_pretty(&mut out, &batch).wrap_err("Failed to write export")?;
        writeln!(out)?;
        out.flush()?;
    } else {
        let mut sink = TextSink::new(io::BufWriter::new(stdout));
        engine.publish(&mut sink)?;
        sink.into_inner().flush()?;
    }
    Ok(())
}
