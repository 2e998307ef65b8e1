use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use marquee_api::traits::{ListRef, RatingTarget, Visibility};
use marquee_core::config::AppConfig;
use marquee_core::filter::{DateFilter, FilterCriteria, SortOrder};
use marquee_core::models::{Category, MediaKind, PersonalPatch, ShowKey};
use marquee_runtime::Runtime;

mod logging;
mod output;

use output::Output;

#[derive(Parser)]
#[command(name = "marquee")]
#[command(about = "Track the movies and series you watch")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the library with the saved filter and sort applied
    List,
    /// Start tracking a title
    Track {
        #[command(flatten)]
        title: TitleArg,
        /// Category (defaults to `general.default_category`)
        #[arg(long)]
        category: Option<Category>,
    },
    /// Re-fetch metadata of a tracked title
    Refresh {
        #[command(flatten)]
        title: TitleArg,
    },
    /// Stop tracking a title
    Untrack {
        #[command(flatten)]
        title: TitleArg,
    },
    /// Change personal fields of a tracked title
    Edit {
        #[command(flatten)]
        title: TitleArg,
        #[command(flatten)]
        fields: EditArgs,
    },
    /// Mark episodes of a tracked series as watched
    Episodes {
        /// Series id
        id: u64,
        season: u32,
        #[arg(required = true)]
        episodes: Vec<u32>,
        /// Unmark instead
        #[arg(long)]
        unwatch: bool,
        /// Number of episodes in the season, to report whether it is complete
        #[arg(long, value_name = "N")]
        season_length: Option<u32>,
    },
    /// Saved library filter
    Filter {
        #[command(subcommand)]
        cmd: FilterCommands,
    },
    /// Genre names
    Genres {
        #[command(subcommand)]
        cmd: GenreCommands,
    },
    /// Search the remote catalog
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Add to or remove from the remote watchlist
    Watchlist {
        action: Toggle,
        #[command(flatten)]
        title: TitleArg,
    },
    /// Add to or remove from remote favorites
    Favorite {
        action: Toggle,
        #[command(flatten)]
        title: TitleArg,
    },
    /// Add to or remove from a custom remote list
    ListItem {
        action: Toggle,
        list_id: u64,
        #[command(flatten)]
        title: TitleArg,
    },
    /// Rate a title or episode remotely (0.5 to 10, in steps of 0.5)
    Rate {
        #[command(flatten)]
        target: RatingArg,
        value: f32,
    },
    /// Remove a remote rating
    Unrate {
        #[command(flatten)]
        target: RatingArg,
    },
    /// Custom remote lists
    Lists {
        #[command(subcommand)]
        cmd: ListCommands,
    },
    /// Configuration file
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Args)]
struct TitleArg {
    /// Remote title id
    id: u64,
    #[command(flatten)]
    kind: KindFlag,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct KindFlag {
    #[arg(long)]
    movie: bool,
    #[arg(long)]
    series: bool,
}

impl TitleArg {
    fn key(&self) -> ShowKey {
        ShowKey::new(self.id, self.kind.movie)
    }
}

#[derive(Args)]
struct RatingArg {
    #[command(flatten)]
    title: TitleArg,
    /// Rate one episode instead of the series
    #[arg(long, requires = "episode")]
    season: Option<u32>,
    #[arg(long, requires = "season")]
    episode: Option<u32>,
}

impl RatingArg {
    fn target(&self) -> Result<RatingTarget> {
        let key = self.title.key();
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => {
                if key.is_movie {
                    bail!("episodes can only be rated on a series");
                }
                Ok(RatingTarget::Episode {
                    series_id: key.external_id,
                    season,
                    episode,
                })
            }
            _ => Ok(RatingTarget::Title(marquee_runtime::media_ref(key))),
        }
    }
}

#[derive(Args)]
struct EditArgs {
    #[arg(long)]
    category: Option<Category>,
    /// Personal rating 0..=10, or "none"
    #[arg(long, value_parser = parse_rating)]
    rating: Option<Clearable<u8>>,
    /// Start date YYYY-MM-DD, or "none"
    #[arg(long, value_parser = parse_date)]
    start: Option<Clearable<NaiveDate>>,
    /// Finish date YYYY-MM-DD, or "none"
    #[arg(long, value_parser = parse_date)]
    finish: Option<Clearable<NaiveDate>>,
    #[arg(long)]
    rewatch_count: Option<u32>,
    #[arg(long)]
    episodes_seen: Option<u32>,
}

impl EditArgs {
    fn into_patch(self) -> PersonalPatch {
        PersonalPatch {
            category: self.category,
            personal_rating: self.rating.map(|v| v.0),
            start_date: self.start.map(|v| v.0),
            finish_date: self.finish.map(|v| v.0),
            rewatch_count: self.rewatch_count,
            episodes_seen: self.episodes_seen,
        }
    }
}

/// A value that may be set or cleared ("none").
#[derive(Debug, Clone, Copy, PartialEq)]
struct Clearable<T>(Option<T>);

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    Add,
    Remove,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Movie,
    Series,
}

impl From<KindArg> for MediaKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Movie => MediaKind::Movie,
            KindArg::Series => MediaKind::Series,
        }
    }
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Print the saved filter and sort order
    Show,
    /// Replace the saved filter
    Set {
        /// Keep only these categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<Category>,
        /// Keep only these media types (repeatable)
        #[arg(long = "media", value_enum)]
        media: Vec<KindArg>,
        /// Keep titles with any of these genre ids (repeatable)
        #[arg(long = "genre")]
        genres: Vec<u32>,
        /// Drop titles with any of these genre ids (repeatable)
        #[arg(long = "exclude-genre")]
        excluded_genres: Vec<u32>,
        /// Keep titles mentioning any of these words (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        /// Drop titles mentioning any of these words (repeatable)
        #[arg(long = "exclude-keyword")]
        excluded_keywords: Vec<String>,
        /// Release date range, inclusive
        #[arg(long, num_args = 2, value_names = ["START", "END"], value_parser = parse_day, conflicts_with = "in_theaters")]
        between: Option<Vec<NaiveDate>>,
        /// Movies released in the last 31 days
        #[arg(long)]
        in_theaters: bool,
        /// default, best_rated, release_date or alphabetical
        #[arg(long, default_value = "default")]
        sort: SortOrder,
    },
    /// Clear the saved filter
    Reset,
}

#[derive(Subcommand)]
enum GenreCommands {
    /// Re-fetch genre names for movies and series
    Refresh,
}

#[derive(Subcommand)]
enum ListCommands {
    /// Create a custom list and print its id
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        public: bool,
    },
    /// Delete a custom list
    Delete { list_id: u64 },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the built-in defaults to the config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| format!("{raw}: {e}"))
}

fn parse_date(raw: &str) -> Result<Clearable<NaiveDate>, String> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(Clearable(None));
    }
    parse_day(raw).map(|d| Clearable(Some(d)))
}

fn parse_rating(raw: &str) -> Result<Clearable<u8>, String> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(Clearable(None));
    }
    match raw.trim().parse::<u8>() {
        Ok(r) if r <= 10 => Ok(Clearable(Some(r))),
        _ => Err(format!("{raw}: expected 0 to 10 or \"none\"")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let mut config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());

    logging::init(cli.verbose, cli.quiet, config.logging.file.as_deref())?;
    let out = Output::new(cli.json);

    if let Commands::Config { cmd } = &cli.command {
        return run_config(cmd, &config, &config_path, &out);
    }

    let runtime = match &cli.db {
        Some(path) => Runtime::open_at(config, path).await?,
        None => Runtime::open(config).await?,
    };
    run(cli.command, &runtime, &out).await
}

fn run_config(
    cmd: &ConfigCommands,
    config: &AppConfig,
    path: &std::path::Path,
    out: &Output,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let mut shown = config.clone();
            for secret in [&mut shown.remote.access_token, &mut shown.remote.api_key] {
                if secret.is_some() {
                    *secret = Some("********".into());
                }
            }
            out.value(&shown);
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::builtin()?.save_to(path)?;
            out.message(format!("Wrote {}", path.display()));
        }
    }
    Ok(())
}

async fn run(command: Commands, rt: &Runtime, out: &Output) -> Result<()> {
    match command {
        Commands::List => {
            let records = rt.library_view().await?;
            out.records(&records, rt.genres());
        }
        Commands::Track { title, category } => {
            let record = rt.track_title(title.key(), category).await?;
            out.record(&record, rt.genres());
        }
        Commands::Refresh { title } => {
            let record = rt.refresh_title(title.key()).await?;
            out.record(&record, rt.genres());
        }
        Commands::Untrack { title } => {
            let key = title.key();
            if rt.untrack(key).await? {
                out.message(format!("Untracked {key}"));
            } else {
                out.message(format!("{key} was not tracked"));
            }
        }
        Commands::Edit { title, fields } => {
            let patch = fields.into_patch();
            if patch.is_empty() {
                bail!("nothing to change");
            }
            let record = rt.edit(title.key(), patch).await?;
            out.record(&record, rt.genres());
        }
        Commands::Episodes {
            id,
            season,
            episodes,
            unwatch,
            season_length,
        } => {
            let seen = rt.mark_episodes(id, season, episodes, !unwatch).await?;
            let marked = rt.watched_episodes(id, season).await?;
            let mut msg = format!("{seen} episodes seen; marked in season {season}: {marked:?}");
            if let Some(length) = season_length {
                if rt.is_season_watched(id, season, length).await? {
                    msg.push_str(&format!("; season {season} fully watched"));
                } else {
                    msg.push_str(&format!("; season {season} not finished"));
                }
            }
            out.message(msg);
        }
        Commands::Filter { cmd } => run_filter(cmd, rt, out).await?,
        Commands::Genres {
            cmd: GenreCommands::Refresh,
        } => {
            for kind in MediaKind::ALL {
                let count = rt.refresh_genres(*kind).await?;
                out.message(format!("{kind}: {count} genres"));
            }
        }
        Commands::Search { query, page } => match rt.search(&query, page).await? {
            Some(page) => out.search(&page),
            None => out.message("Search superseded"),
        },
        Commands::Watchlist { action, title } => {
            membership(rt, out, title.key(), ListRef::Watchlist, action).await?;
        }
        Commands::Favorite { action, title } => {
            membership(rt, out, title.key(), ListRef::Favorites, action).await?;
        }
        Commands::ListItem {
            action,
            list_id,
            title,
        } => {
            membership(rt, out, title.key(), ListRef::Custom(list_id), action).await?;
        }
        Commands::Rate { target, value } => {
            let target = target.target()?;
            let outcome = rt.rate(target, value)?.wait().await;
            out.outcome(&format!("rating {target}"), &outcome);
        }
        Commands::Unrate { target } => {
            let target = target.target()?;
            let outcome = rt.clear_rating(target)?.wait().await;
            out.outcome(&format!("rating {target}"), &outcome);
        }
        Commands::Lists { cmd } => match cmd {
            ListCommands::Create {
                name,
                description,
                public,
            } => {
                let visibility = if public {
                    Visibility::Public
                } else {
                    Visibility::Private
                };
                let list = rt.create_list(&name, &description, visibility).await?;
                out.message(format!("Created {list}"));
            }
            ListCommands::Delete { list_id } => {
                rt.delete_list(ListRef::Custom(list_id)).await?;
                out.message(format!("Deleted list {list_id}"));
            }
        },
        Commands::Config { .. } => {}
    }
    Ok(())
}

async fn membership(
    rt: &Runtime,
    out: &Output,
    key: ShowKey,
    list: ListRef,
    action: Toggle,
) -> Result<()> {
    // Load the remote state first so a failed change restores the real value.
    if let Err(e) = rt.seed_membership(list, key.kind()).await {
        tracing::debug!(%list, error = %e, "Could not load list state");
    }
    let included = matches!(action, Toggle::Add);
    let outcome = rt.set_membership(key, list, included)?.wait().await;
    let item = marquee_runtime::media_ref(key);
    out.outcome(&format!("{item} in {list}"), &outcome);
    Ok(())
}

async fn run_filter(cmd: FilterCommands, rt: &Runtime, out: &Output) -> Result<()> {
    match cmd {
        FilterCommands::Show => {
            let (criteria, sort) = rt.load_filter().await?;
            out.value(&serde_json::json!({ "criteria": criteria, "sort": sort }));
        }
        FilterCommands::Set {
            categories,
            media,
            genres,
            excluded_genres,
            keywords,
            excluded_keywords,
            between,
            in_theaters,
            sort,
        } => {
            let dates = match between.as_deref() {
                Some([start, end]) => DateFilter::Between {
                    start: *start,
                    end: *end,
                },
                Some(_) => bail!("--between takes a start and an end date"),
                None if in_theaters => DateFilter::InTheaters,
                None => DateFilter::Any,
            };
            let criteria = FilterCriteria {
                categories: categories.into_iter().collect(),
                media_kinds: media.into_iter().map(MediaKind::from).collect(),
                required_genres: genres.into_iter().collect(),
                excluded_genres: excluded_genres.into_iter().collect(),
                include_keywords: keywords,
                exclude_keywords: excluded_keywords,
                dates,
            };
            rt.save_filter(criteria, sort).await?;
            out.message("Filter saved");
        }
        FilterCommands::Reset => {
            rt.reset_filter().await?;
            out.message("Filter cleared");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rating_and_date_parsers() {
        assert_eq!(parse_rating("7"), Ok(Clearable(Some(7))));
        assert_eq!(parse_rating("none"), Ok(Clearable(None)));
        assert!(parse_rating("11").is_err());
        assert_eq!(parse_date("none"), Ok(Clearable(None)));
        assert_eq!(
            parse_date("2024-02-29"),
            Ok(Clearable(NaiveDate::from_ymd_opt(2024, 2, 29)))
        );
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_episode_rating_target() {
        let cli = Cli::try_parse_from([
            "marquee", "rate", "1396", "--series", "--season", "1", "--episode", "3", "8.5",
        ])
        .unwrap();
        let Commands::Rate { target, value } = cli.command else {
            panic!("expected rate");
        };
        assert_eq!(value, 8.5);
        assert_eq!(
            target.target().unwrap(),
            RatingTarget::Episode {
                series_id: 1396,
                season: 1,
                episode: 3
            }
        );
    }

    #[test]
    fn test_episodes_season_length_flag() {
        let cli = Cli::try_parse_from([
            "marquee", "episodes", "1396", "1", "1", "2", "--season-length", "7",
        ])
        .unwrap();
        let Commands::Episodes {
            episodes,
            season_length,
            ..
        } = cli.command
        else {
            panic!("expected episodes");
        };
        assert_eq!(episodes, vec![1, 2]);
        assert_eq!(season_length, Some(7));
    }

    #[test]
    fn test_kind_flag_is_required() {
        assert!(Cli::try_parse_from(["marquee", "track", "603"]).is_err());
        assert!(Cli::try_parse_from(["marquee", "track", "603", "--movie", "--series"]).is_err());
    }
}
