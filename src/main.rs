use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use spines::catalog::{self, CatalogUpdate};
use spines::config::Config;
use spines::db;
use spines::intake::{ShelfPlacement, ValidatedUpload};
use spines::scanner;
use spines::users;
use spines::vision::VisionClient;

#[derive(Parser)]
#[command(name = "spines")]
#[command(about = "Bookshelf photo inventory: vision-model extraction into a searchable catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Batch-scan a directory of shelf photos into one CSV catalog
    Scan {
        /// Directory holding the photos (.png, .jpg, .jpeg, .webp)
        #[arg(long)]
        dir: PathBuf,
        /// Output CSV path
        #[arg(long, default_value = "catalog.csv")]
        out: PathBuf,
    },
    /// Process one shelf photo and store its books at a shelf position
    Shelf {
        #[arg(long)]
        image: PathBuf,
        /// Shelf row, 1-10
        #[arg(long)]
        row: i64,
        /// Shelf column, one or two letters
        #[arg(long)]
        column: String,
        /// front or back
        #[arg(long)]
        side: String,
    },
    /// Process one spine photo into the catalog, optionally for a user
    Catalog {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        username: Option<String>,
    },
    /// List all shelf records in shelf order
    List,
    /// Page through catalog records, newest first
    Books {
        #[arg(long)]
        username: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long = "per-page", default_value_t = 20)]
        per_page: i64,
    },
    /// Search catalog records by title or author substring
    Search {
        #[arg(long)]
        q: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long = "per-page", default_value_t = 20)]
        per_page: i64,
    },
    /// Edit a catalog record's title, author, or publisher
    Edit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Delete a catalog record
    Delete {
        #[arg(long)]
        id: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Register a catalog user
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Commands::Scan { dir, out } => {
            let client = VisionClient::new(&config)?;
            let stats = scanner::scan_directory(&client, &dir, &out)?;
            println!(
                "{} images scanned, {} rows written to {} ({} failures)",
                stats.images,
                stats.rows,
                out.display(),
                stats.failed_images
            );
        }
        Commands::Shelf {
            image,
            row,
            column,
            side,
        } => {
            let bytes = read_image(&image)?;
            let placement = ShelfPlacement::new(row, &column, &side)?;
            let upload = ValidatedUpload::new(bytes, placement)?;
            let client = VisionClient::new(&config)?;
            let mut conn = db::open_db(&config.db_path)?;
            let scan =
                spines::process_shelf_image(&mut conn, &client, &upload, &source_name(&image))?;
            println!("{}", serde_json::to_string_pretty(&scan)?);
        }
        Commands::Catalog { image, username } => {
            let bytes = read_image(&image)?;
            let client = VisionClient::new(&config)?;
            let mut conn = db::open_db(&config.db_path)?;
            let owner = resolve_owner(&conn, username.as_deref())?;
            let records = spines::process_catalog_image(
                &mut conn,
                &client,
                owner.as_deref(),
                &bytes,
                &source_name(&image),
            )?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::List => {
            let conn = db::open_db(&config.db_path)?;
            let records = catalog::list_shelf(&conn)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Books {
            username,
            page,
            per_page,
        } => {
            let conn = db::open_db(&config.db_path)?;
            let owner = resolve_owner(&conn, username.as_deref())?;
            let result = catalog::list_catalog(&conn, owner.as_deref(), page, per_page)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Search {
            q,
            username,
            page,
            per_page,
        } => {
            let conn = db::open_db(&config.db_path)?;
            let owner = resolve_owner(&conn, username.as_deref())?;
            let result = catalog::search_catalog(&conn, owner.as_deref(), &q, page, per_page)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Edit {
            id,
            title,
            author,
            publisher,
            username,
        } => {
            let conn = db::open_db(&config.db_path)?;
            let owner = resolve_owner(&conn, username.as_deref())?;
            let update = CatalogUpdate {
                title,
                author,
                publisher,
            };
            catalog::update_catalog_record(&conn, owner.as_deref(), &id, &update)?;
            println!("updated {}", id);
        }
        Commands::Delete { id, username } => {
            let conn = db::open_db(&config.db_path)?;
            let owner = resolve_owner(&conn, username.as_deref())?;
            catalog::delete_catalog_record(&conn, owner.as_deref(), &id)?;
            println!("deleted {}", id);
        }
        Commands::Register { username, password } => {
            let conn = db::open_db(&config.db_path)?;
            let user = users::register(&conn, &username, &password)?;
            println!("registered {} ({})", user.username, user.id);
        }
    }

    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("could not read image {}", path.display()))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

fn resolve_owner(conn: &Connection, username: Option<&str>) -> Result<Option<String>> {
    match username {
        None => Ok(None),
        Some(name) => match users::find_by_username(conn, name)? {
            Some(user) => Ok(Some(user.id)),
            None => bail!("unknown user: {}", name),
        },
    }
}
