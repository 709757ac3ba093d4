// mpa CLI binary

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use mpa_lib::constants::{CONFIG_FILENAME, DEFAULT_DB_FILENAME, IMAGE_EXTENSIONS};
use mpa_lib::db::get_files_dir;
use mpa_lib::{
    AlbumEdit, AlbumStore, Gallery, GalleryConfig, GalleryError, ItemError, PreviewSize,
    UploadBatch,
};

#[derive(Parser)]
#[command(name = "mpa")]
#[command(about = "mpa - photo albums with a content-addressed store", long_about = None)]
#[command(version)]
struct Cli {
    /// Catalog database file (defaults to the user data directory)
    #[arg(short = 'f', long, global = true)]
    db: Option<PathBuf>,

    /// Concurrent preview jobs (overrides config.json)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Preview queue length before requests are held back (overrides config.json)
    #[arg(long, global = true)]
    queue_limit: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog and its files directory
    Init,

    /// Create an album from image files or directories
    AddAlbum {
        /// Album name
        #[arg(short, long)]
        name: String,
        /// Owning user id
        #[arg(short, long, default_value = "1")]
        owner: i64,
        /// Index (0-based, in staging order) of the cover image
        #[arg(long)]
        cover: Option<usize>,
        /// Title for a staged file, as INDEX=TITLE
        #[arg(long = "title", value_parser = parse_key_value)]
        titles: Vec<(String, String)>,
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Rename an album, delete or retitle images, or add more
    EditAlbum {
        /// Album ID
        id: i64,
        /// Owning user id
        #[arg(short, long, default_value = "1")]
        owner: i64,
        /// New album name
        #[arg(short, long)]
        name: Option<String>,
        /// Image ID to delete (repeatable)
        #[arg(long = "delete")]
        deleted: Vec<i64>,
        /// New image title, as IMAGE_ID=TITLE
        #[arg(long = "title", value_parser = parse_key_value)]
        titles: Vec<(String, String)>,
        /// Index (0-based) of a new file to use as cover
        #[arg(long)]
        cover: Option<usize>,
        /// Image files or directories to add
        paths: Vec<PathBuf>,
    },

    /// List albums
    Albums {
        /// Only albums of this user
        #[arg(short, long)]
        owner: Option<i64>,
    },

    /// Show album details
    Show {
        /// Album ID
        id: i64,
    },

    /// Print the path of an image preview, generating it if needed
    Preview {
        /// Image ID
        id: i64,
        /// large or thumbnail
        #[arg(short, long, default_value = "large")]
        size: PreviewSize,
    },

    /// Generate missing previews for the whole catalog
    Warm,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db.clone() {
        Some(path) => path,
        None => default_db_path()?,
    };

    match cli.command {
        Commands::Init => cmd_init(&db_path),
        Commands::Albums { owner } => cmd_albums(&db_path, owner),
        Commands::Show { id } => cmd_show(&db_path, id),
        command => {
            let config = load_config(&db_path, cli.workers, cli.queue_limit)?;
            let gallery = Gallery::open(&db_path, &config)?;
            let result = run_gallery_command(&gallery, command).await;
            gallery.shutdown().await;
            result
        }
    }
}

async fn run_gallery_command(gallery: &Gallery, command: Commands) -> Result<()> {
    match command {
        Commands::AddAlbum { name, owner, cover, titles, paths } => {
            cmd_add_album(gallery, owner, name, cover, titles, paths).await
        }
        Commands::EditAlbum { id, owner, name, deleted, titles, cover, paths } => {
            let edit = AlbumEdit {
                name,
                deleted,
                titles: titles.into_iter().collect::<HashMap<_, _>>(),
            };
            cmd_edit_album(gallery, owner, id, edit, cover, paths).await
        }
        Commands::Preview { id, size } => {
            let path = gallery.request_preview(id, size).await?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Warm => {
            let report = gallery.warm_previews().await?;
            println!("{} blobs, {} ready, {} failed", report.total, report.ready, report.failed);
            Ok(())
        }
        Commands::Init | Commands::Albums { .. } | Commands::Show { .. } => Ok(()),
    }
}

fn default_db_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "mpa").context("Failed to determine project directories")?;
    Ok(dirs.data_dir().join(DEFAULT_DB_FILENAME))
}

fn load_config(db_path: &Path, workers: Option<usize>, queue_limit: Option<usize>) -> Result<GalleryConfig> {
    let mut config = Gallery::load_config(db_path)?;
    if let Some(workers) = workers {
        config.preview_workers = workers;
    }
    if let Some(limit) = queue_limit {
        config.preview_queue_limit = limit;
    }
    config.validate()?;
    Ok(config)
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

fn cmd_init(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        anyhow::bail!("Catalog already exists at {}", db_path.display());
    }
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    AlbumStore::open(db_path)?;
    let files_dir = get_files_dir(db_path);
    let config_path = files_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        GalleryConfig::default().save(&config_path)?;
    }

    println!("Initialized catalog at {}", db_path.display());
    println!("Structure created:");
    println!("  {}/images/    - Originals", files_dir.display());
    println!("  {}/preview/   - Previews", files_dir.display());
    println!("  {}/upload/    - Upload staging", files_dir.display());
    println!("  {}/{}", files_dir.display(), CONFIG_FILENAME);
    Ok(())
}

/// Expand directories into the image files they contain, sorted by path.
fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn stage(gallery: &Gallery, paths: &[PathBuf], cover: Option<usize>) -> Result<UploadBatch> {
    let mut batch = gallery.new_upload_batch()?;
    for path in collect_images(paths) {
        batch.add_path(&path);
    }
    if let Some(index) = cover {
        if !batch.set_cover(index) {
            anyhow::bail!("Cover index {} is out of range ({} files staged)", index, batch.files().len());
        }
    }
    Ok(batch)
}

fn print_problems(errors: &[ItemError]) {
    if errors.is_empty() {
        return;
    }
    println!("Problems:");
    for e in errors {
        println!("  {}", e);
    }
}

/// Report item errors carried by a failed mutation, then fail.
fn fail_with_items(err: GalleryError) -> anyhow::Error {
    print_problems(err.item_errors());
    anyhow::Error::new(err)
}

async fn cmd_add_album(
    gallery: &Gallery,
    owner: i64,
    name: String,
    cover: Option<usize>,
    titles: Vec<(String, String)>,
    paths: Vec<PathBuf>,
) -> Result<()> {
    let mut batch = stage(gallery, &paths, cover)?;
    for (index, title) in titles {
        let index: usize = index.parse().with_context(|| format!("Bad file index '{}'", index))?;
        if !batch.set_title(index, title) {
            anyhow::bail!("Title index {} is out of range", index);
        }
    }
    let received = batch.received();

    let (outcome, previews) = gallery
        .add_album_with_previews(owner, name, batch)
        .await
        .map_err(fail_with_items)?;

    if outcome.added == received {
        println!("All uploaded files added to album {}.", outcome.album_id);
    } else {
        println!("{} out of {} files added to album {}.", outcome.added, received, outcome.album_id);
    }
    print_problems(&outcome.errors);

    // Wait for the previews scheduled by the add before exiting
    previews.await?;
    Ok(())
}

async fn cmd_edit_album(
    gallery: &Gallery,
    owner: i64,
    album_id: i64,
    edit: AlbumEdit,
    cover: Option<usize>,
    paths: Vec<PathBuf>,
) -> Result<()> {
    check_edit_cover(&paths, cover)?;
    let batch = if paths.is_empty() {
        None
    } else {
        Some(stage(gallery, &paths, cover)?)
    };

    let (outcome, previews) = gallery
        .edit_album_with_previews(owner, album_id, edit, batch)
        .await
        .map_err(fail_with_items)?;

    if outcome.deleted {
        println!("Album {} removed: it has no images left.", album_id);
    } else {
        println!(
            "Album {}: {} deleted, {} titles changed, {} added.",
            album_id, outcome.deleted_count, outcome.title_edit_count, outcome.added
        );
    }
    print_problems(&outcome.errors);

    previews.await?;
    Ok(())
}

/// `--cover` picks one of the new files, so it needs files to pick from.
fn check_edit_cover(paths: &[PathBuf], cover: Option<usize>) -> Result<()> {
    if let (Some(index), true) = (cover, paths.is_empty()) {
        anyhow::bail!("Cover index {} given but no files to add", index);
    }
    Ok(())
}

fn cmd_albums(db_path: &Path, owner: Option<i64>) -> Result<()> {
    let albums = AlbumStore::open(db_path)?;
    let list = albums.list_albums(owner)?;

    if list.is_empty() {
        println!("No albums.");
        return Ok(());
    }

    println!("{:<6} {:<6} {:<20} {}", "ID", "OWNER", "MODIFIED", "NAME");
    println!("{}", "-".repeat(60));
    for album in list {
        println!("{:<6} {:<6} {:<20} {}", album.id, album.owner_id, album.modified, album.name);
    }
    Ok(())
}

fn cmd_show(db_path: &Path, id: i64) -> Result<()> {
    let albums = AlbumStore::open(db_path)?;
    let album = albums.get_album(id)?;
    let images = albums.list_album_images(id)?;

    println!("Album {}: {}", album.id, album.name);
    println!("  Owner:    {}", album.owner_id);
    println!("  Created:  {}", album.created);
    println!("  Modified: {}", album.modified);
    if let Some(cover) = album.image_id {
        println!(
            "  Cover:    {} ({})",
            cover,
            if album.is_portrait { "portrait" } else { "landscape" }
        );
    }
    println!("  Images:   {}", images.len());
    for image in images {
        let title = if image.title.is_empty() { "-" } else { image.title.as_str() };
        println!(
            "    {:<6} {}  {}  {}  {}",
            image.id,
            image.created,
            &image.sha256sum[..12.min(image.sha256sum.len())],
            image.owner_file_name,
            title
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_cover_needs_new_files() {
        assert!(check_edit_cover(&[], Some(0)).is_err());
        assert!(check_edit_cover(&[], None).is_ok());
        assert!(check_edit_cover(&[PathBuf::from("a.jpg")], Some(0)).is_ok());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("3=Beach").unwrap(), ("3".to_string(), "Beach".to_string()));
        assert!(parse_key_value("no-separator").is_err());
    }
}
