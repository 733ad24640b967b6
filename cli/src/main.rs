/*
    spotfm-rs | Rust CLI tool to mirror a Spotify library and find duplicate tracks.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::warn;
use spotfm_core::config::SpotifyConfig;
use spotfm_core::lastfm::{self, LastFmClient};
use spotfm_core::{
    dupes, get_spotify_client, report, workflows, CatalogApi, Config, Database, Library,
    ObjectCache, Paths, SpotifyCatalog,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spotfm")]
#[command(about = "Mirror your Spotify library locally, find duplicates and check Last.fm scrobbles", long_about = None)]
struct Cli {
    /// Config file (default: ~/.spotfm/spotfm.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    group: Group,
}

#[derive(Subcommand)]
enum Group {
    /// Last.fm scrobble reports
    Lastfm {
        #[command(subcommand)]
        command: LastfmCommand,
    },
    /// Spotify library mirror and workflows
    Spotify {
        #[command(subcommand)]
        command: SpotifyCommand,
    },
    /// Local database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand)]
enum LastfmCommand {
    /// Lists recently played tracks with their scrobble counts
    RecentScrobbles {
        /// Number of recent tracks to look at
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// Only show tracks scrobbled at least this many times
        #[arg(short = 's', long, default_value_t = 4)]
        scrobbles_minimum: usize,
        /// Period in days (7, 30, 90, 180 or 365)
        #[arg(short, long, default_value_t = 90)]
        period: u32,
    },
}

#[derive(Subcommand)]
enum SpotifyCommand {
    /// Counts distinct tracks over all playlists or the matching ones
    CountTracks {
        /// Playlist id or name pattern (SQL LIKE)
        #[arg(short = 'p', long = "playlist", value_name = "PATTERN", num_args = 1..)]
        patterns: Vec<String>,
    },
    /// Lists stored playlists with their track counts
    ListPlaylists,
    /// Refreshes playlists from Spotify into the database
    UpdatePlaylists {
        /// Only refresh the stored playlists matching this id or name pattern
        #[arg(short = 'p', long = "playlist", value_name = "PATTERN")]
        pattern: Option<String>,
    },
    /// Adds the tracks listed in a file (one id or URL per line)
    AddTracks {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Adds never-seen tracks from the source playlists to the discover playlist
    Discover,
    /// Finds tracks present in several playlists
    FindDupesIds {
        /// Write a CSV report instead of printing
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Finds distinct tracks with similar names
    FindDupesNames {
        /// Write a CSV report instead of printing
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Similarity threshold (0-100)
        #[arg(short, long, default_value_t = dupes::DEFAULT_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: u8,
    },
    /// Finds playlist tracks replaced by a different track in your market
    FindRelinked {
        /// Write a CSV report instead of printing
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Finds playlist tracks by album release date and artist genre
    FindTracks {
        /// Playlist id or name pattern (SQL LIKE)
        #[arg(short = 'p', long = "playlist", value_name = "PATTERN", num_args = 1.., required = true)]
        patterns: Vec<String>,
        /// Earliest album release date (YYYY-MM-DD)
        #[arg(short, long, value_name = "DATE")]
        start_date: Option<String>,
        /// Latest album release date (YYYY-MM-DD)
        #[arg(short, long, value_name = "DATE")]
        end_date: Option<String>,
        /// Case-insensitive regular expression matched against artist genres
        #[arg(short, long, value_name = "REGEX")]
        genre: Option<String>,
        /// Write a CSV report instead of printing
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DbCommand {
    /// Creates the database and its tables
    Init,
    /// Empties every table
    Clean,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // No .env file is fine
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!();
        eprintln!("[ERROR] {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config)?;

    match cli.group {
        Group::Lastfm { command } => match command {
            LastfmCommand::RecentScrobbles {
                limit,
                scrobbles_minimum,
                period,
            } => handle_recent_scrobbles(&ctx, limit, scrobbles_minimum, period).await,
        },
        Group::Spotify { command } => match command {
            SpotifyCommand::CountTracks { patterns } => handle_count_tracks(&ctx, &patterns),
            SpotifyCommand::ListPlaylists => handle_list_playlists(&ctx),
            SpotifyCommand::UpdatePlaylists { pattern } => {
                handle_update_playlists(&ctx, pattern.as_deref()).await
            }
            SpotifyCommand::AddTracks { file } => handle_add_tracks(&ctx, &file).await,
            SpotifyCommand::Discover => handle_discover(&ctx).await,
            SpotifyCommand::FindDupesIds { output } => handle_dupes_ids(&ctx, output.as_deref()),
            SpotifyCommand::FindDupesNames { output, threshold } => {
                handle_dupes_names(&ctx, output.as_deref(), threshold)
            }
            SpotifyCommand::FindRelinked { output } => {
                handle_relinked(&ctx, output.as_deref()).await
            }
            SpotifyCommand::FindTracks {
                patterns,
                start_date,
                end_date,
                genre,
                output,
            } => handle_find_tracks(
                &ctx,
                &patterns,
                start_date.as_deref(),
                end_date.as_deref(),
                genre.as_deref(),
                output.as_deref(),
            ),
        },
        Group::Db { command } => match command {
            DbCommand::Init => {
                ctx.database()?;
                println!("Database ready at {}", ctx.paths.database.display());
                Ok(())
            }
            DbCommand::Clean => {
                ctx.database()?.clean_tables()?;
                println!("Emptied every table of {}", ctx.paths.database.display());
                Ok(())
            }
        },
    }
}

/// Paths and settings shared by every command.
struct Context {
    paths: Paths,
    config: Config,
}

impl Context {
    fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut paths = Paths::discover()?;
        if let Some(path) = config_file {
            paths.config_file = path;
        }

        let config = if paths.config_file.exists() {
            Config::load(&paths.config_file)?
        } else {
            warn!(
                "Config file {} not found, using defaults",
                paths.config_file.display()
            );
            Config::default()
        };

        Ok(Self { paths, config })
    }

    fn spotify(&self) -> SpotifyConfig {
        self.config.spotify()
    }

    fn database(&self) -> Result<Database> {
        Database::open(&self.paths.database)
            .with_context(|| format!("Failed to open {}", self.paths.database.display()))
    }

    async fn online_library(&self) -> Result<Library> {
        let spotify_cfg = self.spotify();
        let client = get_spotify_client(&spotify_cfg, &self.paths)
            .await
            .context("Error initializing Spotify client")?;
        let catalog: Arc<dyn CatalogApi> =
            Arc::new(SpotifyCatalog::new(client, spotify_cfg.market())?);

        Ok(Library::new(
            self.database()?,
            ObjectCache::new(self.paths.cache_dir.clone()),
            Some(catalog),
        ))
    }
}

async fn handle_recent_scrobbles(
    ctx: &Context,
    limit: usize,
    minimum: usize,
    period: u32,
) -> Result<()> {
    let client = LastFmClient::login(ctx.config.lastfm()?)
        .await
        .context("Error initializing Last.fm client")?;

    let lines =
        lastfm::recent_tracks_scrobbles(&client, limit, minimum, period, chrono::Utc::now())
            .await?;
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn handle_count_tracks(ctx: &Context, patterns: &[String]) -> Result<()> {
    let db = ctx.database()?;

    if patterns.is_empty() {
        for (name, count) in db.count_tracks_by_playlists()? {
            println!("{}: {}", name, count);
        }
        println!();
    }
    let total = workflows::count_tracks(&db, patterns)?;
    println!("Total tracks: {}", total);
    Ok(())
}

fn handle_list_playlists(ctx: &Context) -> Result<()> {
    let playlists = ctx.database()?.list_playlists_with_track_counts()?;

    println!("{:<40} | {:<22} | {:>6}", "Name", "ID", "Tracks");
    println!("{:-<40}-+-{:-<22}-+-{:-<6}", "", "", "");
    for (name, id, count) in &playlists {
        let name = if name.chars().count() > 38 {
            format!("{}..", name.chars().take(38).collect::<String>())
        } else {
            name.clone()
        };
        println!("{:<40} | {:<22} | {:>6}", name, id, count);
    }
    println!();
    println!("{} playlists", playlists.len());
    Ok(())
}

async fn handle_update_playlists(ctx: &Context, pattern: Option<&str>) -> Result<()> {
    let library = ctx.online_library().await?;
    let excluded = ctx.spotify().excluded_playlists;

    let updated = library.update_playlists(&excluded, pattern).await?;
    println!();
    println!("[OK] Updated {} playlists", updated.len());
    Ok(())
}

async fn handle_add_tracks(ctx: &Context, file: &Path) -> Result<()> {
    let library = ctx.online_library().await?;

    let report = workflows::add_tracks_from_file(&library, file).await?;
    println!();
    println!("Requested: {}", report.requested);
    println!("Synced:    {}", report.synced.len());
    if !report.missing.is_empty() {
        println!("Not found: {}", report.missing.len());
        for id in &report.missing {
            println!("   - {}", id);
        }
    }
    Ok(())
}

async fn handle_discover(ctx: &Context) -> Result<()> {
    let spotify_cfg = ctx.spotify();
    let Some(discover_id) = spotify_cfg.discover_playlist.as_deref() else {
        bail!("No discover_playlist set in the [spotify] section of the config file");
    };
    if spotify_cfg.sources_playlists.is_empty() {
        bail!("No sources_playlists set in the [spotify] section of the config file");
    }

    let library = ctx.online_library().await?;
    let report =
        workflows::discover_from_playlists(&library, discover_id, &spotify_cfg.sources_playlists)
            .await?;

    println!();
    println!("Sources checked:  {}", report.sources_checked);
    println!("Orphans skipped:  {}", report.skipped_orphans.len());
    println!(
        "New tracks added: {} (to {})",
        report.new_tracks.len(),
        report.discover_playlist
    );
    Ok(())
}

fn handle_dupes_ids(ctx: &Context, output: Option<&Path>) -> Result<()> {
    let db = ctx.database()?;
    let excluded = ctx.spotify().excluded_playlists;

    let duplicates = dupes::find_duplicate_ids(&db, &excluded)?;
    match output {
        Some(path) => report::write_id_duplicates(path, &duplicates)?,
        None => duplicates.iter().for_each(|d| println!("{}", d)),
    }
    Ok(())
}

fn handle_dupes_names(ctx: &Context, output: Option<&Path>, threshold: u8) -> Result<()> {
    let db = ctx.database()?;
    let excluded = ctx.spotify().excluded_playlists;

    let duplicates = dupes::find_duplicate_names(&db, &excluded, threshold)?;
    match output {
        Some(path) => report::write_name_duplicates(path, &duplicates)?,
        None => duplicates.iter().for_each(|d| println!("{}", d)),
    }
    Ok(())
}

async fn handle_relinked(ctx: &Context, output: Option<&Path>) -> Result<()> {
    let library = ctx.online_library().await?;
    let spotify_cfg = ctx.spotify();

    let relinked =
        workflows::find_relinked_tracks(&library, &spotify_cfg.excluded_playlists).await?;
    match output {
        Some(path) => report::write_relinked(path, &relinked)?,
        None => relinked.iter().for_each(|t| println!("{}", t)),
    }
    Ok(())
}

fn handle_find_tracks(
    ctx: &Context,
    patterns: &[String],
    start_date: Option<&str>,
    end_date: Option<&str>,
    genre: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let db = ctx.database()?;

    let tracks = workflows::find_tracks_by_criteria(&db, patterns, start_date, end_date, genre)?;
    match output {
        Some(path) => report::write_criteria_tracks(path, &tracks)?,
        None => {
            for track in &tracks {
                println!("{}", track);
            }
            println!();
            println!("Found {} tracks", tracks.len());
        }
    }
    Ok(())
}
