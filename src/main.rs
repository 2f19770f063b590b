use clap::{Parser, Subcommand};
use comic_shelf::catalog::{Catalog, CatalogError, LibraryFilter, worker};
use comic_shelf::comic::Extraction;
use comic_shelf::context::Context;
use comic_shelf::metadata::{PageType, Tag};
use comic_shelf::scope::ScopeNavigator;
use comic_shelf::{config, output};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Shared `--filter` flag for commands that query the catalog.
#[derive(clap::Args, Clone)]
struct FilterArgs {
    /// Restrict to comics, manga or both: all | comics | manga
    #[arg(long, default_value = "all")]
    filter: LibraryFilter,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "comic-shelf")]
#[command(about = "Keeps a comic archive directory tree and its catalog in sync")]
#[command(long_about = "\
Keeps a comic archive directory tree and its catalog in sync

The comics and manga directories are the data source. Every cbz/cb7/cbr
archive and PDF below them is cataloged with its embedded ComicInfo
metadata; files without metadata get it reconstructed from their names.

Library structure (with manage_files = true):

  Comics/
  └── DC/                                        # Publisher
      └── Batman/                                # Series
          ├── 2/                                 # Volume
          │   └── Batman Vol. 2 No. 5 - Night of the Owls.cbz
          └── Unknown Volume/
              └── Batman No. 1 - Untitled.cbr
  .comic-shelf/
  ├── library.xml                                # The catalog
  ├── thumbs/                                    # Cover thumbnails
  └── tmp/                                       # Scratch space

External tools: 7z (listing, extraction, 7z/zip updates), rar (cbr
updates) and pdftoppm (PDF pages).

Run 'comic-shelf gen-config' to generate a documented comic-shelf.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory containing comic-shelf.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Library(LibraryCommand),
    /// Print a stock comic-shelf.toml with all options documented
    GenConfig,
}

/// Commands that work on a loaded library.
#[derive(Subcommand)]
enum LibraryCommand {
    /// Load the catalog and reconcile it with the library directories
    Scan,
    /// List cataloged comics
    List {
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        series: Option<String>,
        #[arg(long)]
        volume: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show one comic's metadata
    Show {
        path: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Edit tags (Tag=Value) or page types (Page<N>=Type) of one comic
    Set {
        path: PathBuf,
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    /// Drill through Publisher → Series → Volume → Title
    Browse {
        keys: Vec<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Render missing cover thumbnails
    Thumbs,
    /// Extract pages as JPEG files
    Extract {
        path: PathBuf,
        dest: PathBuf,
        /// One-based page or inclusive range, e.g. 3 or 1..10
        #[arg(long)]
        pages: Option<String>,
        /// Fit pages inside a SIZE×SIZE square
        #[arg(long)]
        size: Option<u32>,
    },
    /// Move files into the library and catalog them
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Drop a comic from the catalog, keeping the file
    Remove { path: PathBuf },
    /// Drop a comic from the catalog and delete the file
    Delete { path: PathBuf },
}

/// One `set` assignment.
enum Assignment {
    Tag(Tag, String),
    Page(usize, PageType),
}

fn parse_assignment(text: &str) -> Result<Assignment, String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected Tag=Value, got '{text}'"))?;
    if let Some(index) = key.strip_prefix("Page")
        && let Ok(index) = index.parse()
    {
        return Ok(Assignment::Page(index, value.parse()?));
    }
    let tag = Tag::from_name(key).ok_or_else(|| format!("unknown tag '{key}'"))?;
    Ok(Assignment::Tag(tag, value.to_string()))
}

/// Zero-based page indices from a one-based `N` or `A..B` selection.
fn parse_pages(selection: Option<&str>, count: usize) -> Result<Vec<usize>, String> {
    let Some(selection) = selection else {
        return Ok((0..count).collect());
    };
    let parse = |s: &str| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid page number '{s}'"))
    };
    let (first, last) = match selection.split_once("..") {
        Some((a, b)) => (parse(a)?, parse(b)?),
        None => {
            let n = parse(selection)?;
            (n, n)
        }
    };
    if first == 0 || first > last || last > count {
        return Err(format!("pages {selection} outside 1..{count}"));
    }
    Ok((first - 1..last).collect())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let command = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::Library(command) => command,
    };

    let config_dir = std::path::absolute(&cli.config)?;
    let settings = config::load_config(&config_dir)?;
    settings.prepare_dirs()?;
    init_thread_pool(&settings.processing);
    let context = Context::new(settings);

    match command {
        LibraryCommand::Scan => {
            let (catalog, report) = worker::open(context)?.wait()??;
            output::print_scan_output(&report, catalog.len());
        }
        LibraryCommand::List {
            publisher,
            series,
            volume,
            filter,
        } => {
            let catalog = load_catalog(&context)?;
            let publisher = publisher.filter(|_| context.settings().group_by_publisher);
            let records: Vec<_> = catalog
                .comics(filter.filter)
                .filter(|r| {
                    let info = r.info();
                    publisher.as_deref().is_none_or(|p| info.get(Tag::Publisher) == p)
                        && series.as_deref().is_none_or(|s| info.get(Tag::Series) == s)
                        && volume.as_deref().is_none_or(|v| info.get(Tag::Volume) == v)
                })
                .collect();
            output::print_comic_list(&records);
        }
        LibraryCommand::Show { path, json } => {
            let catalog = load_catalog(&context)?;
            let path = std::path::absolute(&path)?;
            let record = catalog.get(&path).ok_or(CatalogError::NotFound(path.clone()))?;
            if json {
                output::print_comic_json(record)?;
            } else {
                output::print_comic_detail(record);
            }
        }
        LibraryCommand::Set { path, assignments } => {
            let assignments = assignments
                .iter()
                .map(|a| parse_assignment(a))
                .collect::<Result<Vec<_>, _>>()?;
            let mut catalog = load_catalog(&context)?;
            let path = std::path::absolute(&path)?;

            catalog.start_batch_editing();
            catalog.start_editing(&path)?;
            for assignment in assignments {
                let deferred = match assignment {
                    Assignment::Tag(tag, value) => catalog.set_tag(&path, tag, value)?,
                    Assignment::Page(index, page_type) => {
                        catalog.set_page_type(&path, index, page_type)?
                    }
                };
                debug!(path = %path.display(), ?deferred, "assignment applied");
            }
            let written = catalog.finish_editing(&path)?;
            catalog.finish_batch_editing()?;
            info!(path = %path.display(), ?written, "edit finished");
        }
        LibraryCommand::Browse { keys, filter } => {
            let catalog = load_catalog(&context)?;
            let mut nav = ScopeNavigator::for_settings(context.settings());
            nav.set_filter(filter.filter);
            for key in keys {
                nav.drill_in(key)?;
            }
            let rows = nav.rows(&catalog);
            output::print_scope_rows(&nav, &rows);
        }
        LibraryCommand::Thumbs => {
            let mut catalog = load_catalog(&context)?;
            let rendered = catalog.verify_thumbnails();
            println!("Rendered {rendered} of {} thumbnails", catalog.len());
        }
        LibraryCommand::Extract {
            path,
            dest,
            pages,
            size,
        } => {
            let mut catalog = load_catalog(&context)?;
            let path = std::path::absolute(&path)?;
            let record = catalog
                .get_mut(&path)
                .ok_or(CatalogError::NotFound(path.clone()))?;
            let indices = parse_pages(pages.as_deref(), record.page_count())?;
            let cancel = AtomicBool::new(false);
            match record.extract_pages(&indices, &dest, size, &cancel)? {
                Extraction::Completed(paths) => output::print_extracted(&paths),
                Extraction::Cancelled => println!("Extraction cancelled"),
            }
        }
        LibraryCommand::Import { files } => {
            let mut catalog = load_catalog(&context)?;
            catalog.start_batch_editing();
            let mut failed = 0;
            for file in &files {
                match catalog.import(file) {
                    Ok(path) => println!("{} → {}", file.display(), path.display()),
                    Err(e) => {
                        warn!(path = %file.display(), error = %e, "import failed");
                        failed += 1;
                    }
                }
            }
            catalog.finish_batch_editing()?;
            if failed > 0 {
                return Err(format!("{failed} of {} imports failed", files.len()).into());
            }
        }
        LibraryCommand::Remove { path } => {
            let mut catalog = load_catalog(&context)?;
            let path = std::path::absolute(&path)?;
            catalog.remove(&path)?;
            println!("Removed {}", path.display());
        }
        LibraryCommand::Delete { path } => {
            let mut catalog = load_catalog(&context)?;
            let path = std::path::absolute(&path)?;
            catalog.delete(&path)?;
            println!("Deleted {}", path.display());
        }
    }

    Ok(())
}

/// Load `library.xml` on the worker thread.
fn load_catalog(context: &Arc<Context>) -> Result<Catalog, CatalogError> {
    worker::load(Arc::clone(context))?.wait()?
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "comic_shelf=debug"
    } else if quiet {
        "comic_shelf=warn"
    } else {
        "comic_shelf=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool used for hashing during scans.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
