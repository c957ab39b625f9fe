mod cli;

use clap::Parser;
use cli::{Cli, Command, GenerationOptions, HistoryAction};
use fluxgen::{
    logger::{self, LoggerConfig},
    BatchEvent, BatchJob, Config, FluxStudio, GenerationRequest, GenerationResult, HistoryEntry,
    HistoryStore,
};
use futures::StreamExt;
use std::path::PathBuf;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let logger_config = if cli.verbose {
        LoggerConfig::development()
    } else {
        LoggerConfig::default()
    };
    logger::init_with_config(logger_config.with_json_output(cli.json_logs))?;

    if dotenv_loaded {
        log::debug!(".env file loaded");
    } else {
        log::debug!("No .env file found, using process environment");
    }

    let mut config = Config::from_env()?;

    match cli.command {
        Command::Generate { prompt, options } => generate(&config, &prompt, &options).await,
        Command::Batch {
            prompts,
            file,
            concurrency,
            options,
        } => {
            if let Some(concurrency) = concurrency {
                config.batch.concurrency = concurrency;
            }
            batch(&config, prompts, file, &options).await
        }
        Command::History { action } => history(&config, action).await,
    }
}

async fn generate(config: &Config, prompt: &str, options: &GenerationOptions) -> CliResult {
    let request = GenerationRequest::parse(prompt, &options.aspect_ratio, &options.quality)?;
    logger::log_config_info(config);

    let studio = FluxStudio::new(config).await?;
    log::info!("Starting image generation...");
    let outcome = studio.generate(&request).await?;

    if let Some(warning) = &outcome.history_warning {
        log::warn!("Prompt not saved to history: {}", warning);
    }

    match outcome.result {
        GenerationResult::Success(image) => {
            let path = image.save_to_dir(&options.output, 0).await?;
            println!("{}", path.display());
            Ok(())
        }
        GenerationResult::Failure { reason } => {
            log::error!("Error: {}", reason);
            Err(reason.into())
        }
    }
}

async fn batch(
    config: &Config,
    mut prompts: Vec<String>,
    file: Option<PathBuf>,
    options: &GenerationOptions,
) -> CliResult {
    if let Some(path) = file {
        let text = tokio::fs::read_to_string(&path).await?;
        prompts.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }

    let job = BatchJob::new(
        &prompts,
        options.aspect_ratio.parse()?,
        options.quality.parse()?,
    )?;
    logger::log_config_info(config);

    let studio = FluxStudio::new(config).await?;
    let mut handle = studio.start_batch(job)?;

    let cancel = handle.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Cancellation requested, waiting for running generations...");
            cancel.cancel();
        }
    });

    let mut events = handle.events().ok_or("batch events already taken")?;
    let mut total = 0;
    let mut done = 0;
    while let Some(event) = events.next().await {
        match event {
            BatchEvent::Started { total: count, .. } => {
                total = count;
                log::info!("Starting batch of {} prompts...", count);
            }
            BatchEvent::Submitted { index, prompt } => {
                log::info!("#{} submitted: {}", index + 1, prompt);
            }
            BatchEvent::Completed {
                index,
                success,
                reason,
            } => {
                done += 1;
                if success {
                    log::info!("#{} done. Progress: {}/{}", index + 1, done, total);
                } else {
                    log::warn!(
                        "#{} failed: {}. Progress: {}/{}",
                        index + 1,
                        reason.unwrap_or_default(),
                        done,
                        total
                    );
                }
            }
            BatchEvent::CancelRequested { started } => {
                log::warn!("Batch cancelled, {} of {} prompts were started", started, total);
            }
            BatchEvent::Finished { .. } => {}
        }
    }

    let report = handle.wait().await?;
    for warning in studio.record_batch(&report).await {
        log::warn!("Prompt not saved to history: {}", warning);
    }

    for item in &report.items {
        match &item.result {
            GenerationResult::Success(image) => {
                let path = image.save_to_dir(&options.output, item.index).await?;
                println!("#{}\t{}", item.index + 1, path.display());
            }
            GenerationResult::Failure { reason } => {
                println!("#{}\tfailed: {}", item.index + 1, reason);
            }
        }
    }

    log::info!(
        "Batch finished: {} succeeded, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped
    );

    if report.failed() > 0 || report.cancelled {
        Err(format!(
            "{} of {} prompts did not produce an image",
            report.failed() + report.skipped,
            report.total()
        )
        .into())
    } else {
        Ok(())
    }
}

async fn history(config: &Config, action: HistoryAction) -> CliResult {
    let store = HistoryStore::open(&config.history).await?;

    match action {
        HistoryAction::List { limit } => {
            for entry in store.list_recent(limit).await {
                print_entry(&entry);
            }
        }
        HistoryAction::Favorites => {
            for entry in store.list_favorites().await {
                print_entry(&entry);
            }
        }
        HistoryAction::Favorite { prompt } => {
            let favorite = store.toggle_favorite(&prompt).await?;
            println!(
                "{} {}",
                if favorite { "Favorited:" } else { "Unfavorited:" },
                prompt.trim()
            );
        }
        HistoryAction::Remove { prompt } => {
            let removed = store.remove(&prompt).await?;
            println!("Removed: {}", removed.prompt);
        }
        HistoryAction::Clear => {
            store.clear().await?;
            println!("History cleared");
        }
    }

    Ok(())
}

fn print_entry(entry: &HistoryEntry) {
    println!(
        "{}  {}  {}",
        entry
            .added_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M"),
        if entry.favorite { "★" } else { " " },
        entry.prompt
    );
}
