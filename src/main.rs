use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use transflow::history::{HistoryConfigUpdate, HistoryEntry, HistoryFilter, HistoryService};
use transflow::{create_client, Config, TranslationService};

#[derive(Parser)]
#[command(name = "transflow")]
#[command(version, about = "Queued text translation with a local history")]
#[command(long_about = "Translate text through Yandex Cloud or Google Gemini, keeping a searchable history of past translations.")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate one or more texts
    Translate {
        /// Texts to translate; each is queued as a separate request
        #[arg(required = true)]
        texts: Vec<String>,

        /// Target language code (e.g., ru, en, de)
        #[arg(short, long)]
        to: String,

        /// Source language code; detected when omitted
        #[arg(short, long)]
        from: Option<String>,

        /// Do not record results in the history
        #[arg(long)]
        no_history: bool,
    },

    /// List past translations, newest first
    History {
        /// Case-insensitive text search over source and translation
        #[arg(short, long)]
        search: Option<String>,

        /// Only entries with this source language
        #[arg(long)]
        source: Option<String>,

        /// Only entries with this target language
        #[arg(long)]
        target: Option<String>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,

        /// Only entries on or after this date (YYYY-MM-DD, UTC)
        #[arg(long, value_parser = parse_date)]
        since: Option<NaiveDate>,

        /// Only entries on or before this date (YYYY-MM-DD, UTC)
        #[arg(long, value_parser = parse_date)]
        until: Option<NaiveDate>,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// List favorites, most used first
    Favorites,

    /// Toggle the favorite flag of an entry
    Favorite {
        id: String,
    },

    /// Delete a single entry
    Delete {
        id: String,
    },

    /// Remove history entries (favorites are kept unless --all is given)
    Clear {
        #[arg(long)]
        all: bool,
    },

    /// Show history statistics
    Stats,

    /// Show or change history settings
    Config {
        /// Maximum number of entries to keep
        #[arg(long)]
        max_entries: Option<usize>,

        /// Encrypt stored text
        #[arg(long, action = clap::ArgAction::Set)]
        encryption: Option<bool>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{}: expected YYYY-MM-DD", e))
}

fn start_of_day(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp_millis())
}

fn end_of_day(date: NaiveDate) -> Option<i64> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map(|d| d.and_utc().timestamp_millis())
}

fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_entry(entry: &HistoryEntry) {
    let marker = if entry.is_favorite {
        style("★").yellow().to_string()
    } else {
        " ".to_string()
    };

    println!(
        "{} {} {} {}→{} ×{}",
        marker,
        style(&entry.id).dim(),
        format_timestamp(entry.timestamp),
        entry.source_lang,
        entry.target_lang,
        entry.usage_count
    );
    println!("    {}", entry.source_text);
    println!("    {}", style(&entry.translated_text).green());
}

async fn run_translate(
    config: &Config,
    history: Option<&HistoryService>,
    texts: Vec<String>,
    to: String,
    from: Option<String>,
) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let client = create_client(config).context("Failed to create translation client")?;
    let service = TranslationService::new(client, config.service_config());

    let pending: Vec<_> = texts
        .iter()
        .map(|text| service.translate(text.clone(), to.clone(), from.clone()))
        .collect();
    debug!("Queued {} request(s): {:?}", pending.len(), service.queue_status());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Translating {} text(s)", texts.len()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let results = futures::future::join_all(pending).await;
    spinner.finish_and_clear();

    let mut failures = 0;
    for (text, result) in texts.iter().zip(results) {
        match result {
            Ok(translation) => {
                println!(
                    "{} {}",
                    style(format!(
                        "[{}→{}]",
                        translation.detected_source_lang, translation.target_lang
                    ))
                    .dim(),
                    translation.translated_text
                );

                if let Some(history) = history {
                    if let Err(e) = history.add_entry(
                        text,
                        &translation.translated_text,
                        &translation.detected_source_lang,
                        &translation.target_lang,
                    ) {
                        warn!("Failed to record history: {}", e);
                    }
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", style("error").red().bold(), text, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} translation(s) failed", failures, texts.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load().context("Failed to load configuration")?;
    let data_dir = config.data_dir()?;
    let history = HistoryService::open(&data_dir)
        .with_context(|| format!("Failed to open history in {}", data_dir.display()))?;

    match cli.command {
        Command::Translate {
            texts,
            to,
            from,
            no_history,
        } => {
            let history = (!no_history).then_some(&history);
            run_translate(&config, history, texts, to, from).await?;
        }
        Command::History {
            search,
            source,
            target,
            favorites,
            since,
            until,
            json,
        } => {
            let filter = HistoryFilter {
                search,
                source_lang: source,
                target_lang: target,
                only_favorites: favorites,
                start_date: since.and_then(start_of_day),
                end_date: until.and_then(end_of_day),
            };
            let entries = history.get_history(&filter);

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No history entries");
            } else {
                entries.iter().for_each(print_entry);
            }
        }
        Command::Favorites => {
            let favorites = history.get_favorites();
            if favorites.is_empty() {
                println!("No favorites yet");
            }
            favorites.iter().for_each(print_entry);
        }
        Command::Favorite { id } => match history.toggle_favorite(&id)? {
            Some(entry) => print_entry(&entry),
            None => anyhow::bail!("No history entry with id {}", id),
        },
        Command::Delete { id } => {
            if !history.delete_entry(&id)? {
                anyhow::bail!("No history entry with id {}", id);
            }
            println!("Deleted {}", id);
        }
        Command::Clear { all } => {
            let removed = history.clear_history(!all)?;
            println!("Removed {} entries", removed);
        }
        Command::Stats => {
            let stats = history.get_stats();
            println!("Entries:   {}", stats.total_entries);
            println!("Favorites: {}", stats.favorites_count);
            println!("Usage:     {}", stats.total_usage);
            if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
                println!("Oldest:    {}", format_timestamp(oldest));
                println!("Newest:    {}", format_timestamp(newest));
            }
        }
        Command::Config {
            max_entries,
            encryption,
        } => {
            let config = if max_entries.is_some() || encryption.is_some() {
                history.update_config(HistoryConfigUpdate {
                    max_entries,
                    enable_encryption: encryption,
                })?
            } else {
                history.get_config()
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-03-01").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(parse_date("03/01/2024").is_err());
    }

    #[test]
    fn test_day_bounds_cover_whole_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let start = start_of_day(date).unwrap();
        let end = end_of_day(date).unwrap();
        assert_eq!(start, 1_709_251_200_000);
        assert_eq!(end - start, 86_400_000 - 1);
    }

    #[test]
    fn test_cli_parses_translate() {
        let cli = Cli::try_parse_from(["transflow", "translate", "Hello", "World", "--to", "ru"])
            .unwrap();
        match cli.command {
            Command::Translate { texts, to, from, no_history } => {
                assert_eq!(texts, vec!["Hello", "World"]);
                assert_eq!(to, "ru");
                assert!(from.is_none());
                assert!(!no_history);
            }
            _ => panic!("expected translate"),
        }
    }

    #[test]
    fn test_cli_parses_config_toggle() {
        let cli = Cli::try_parse_from(["transflow", "config", "--encryption", "true"]).unwrap();
        match cli.command {
            Command::Config { max_entries, encryption } => {
                assert!(max_entries.is_none());
                assert_eq!(encryption, Some(true));
            }
            _ => panic!("expected config"),
        }
    }
}
