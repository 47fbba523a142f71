// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use debcache::cache::PackageFile;
use debcache::depends::DepType;
use debcache::sources::MemorySourceIndex;
use debcache::{Cache, CacheOptions, Package};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::info;

#[derive(Parser)]
#[command(name = "debcache")]
#[command(author, version, about = "Inspect a Debian package cache and simulate changes", long_about = None)]
struct Cli {
    /// dpkg status file
    #[arg(long, default_value = "/var/lib/dpkg/status", global = true)]
    status: PathBuf,

    /// Packages index (plain or .gz), may be given more than once
    #[arg(long = "packages", global = true)]
    packages: Vec<PathBuf>,

    /// Sources index (plain or .gz) used for source downloads and changelogs
    #[arg(long = "sources", global = true)]
    sources: Vec<PathBuf>,

    /// dpkg administrative directory holding info/<package>.list
    #[arg(long, default_value = "/var/lib/dpkg", global = true)]
    dpkg_dir: PathBuf,

    /// Mirror the Packages and Sources indexes belong to
    #[arg(long, default_value = "http://deb.debian.org/debian", global = true)]
    mirror: String,

    /// Origin of the mirror (decides the default changelog location)
    #[arg(long, default_value = "Debian", global = true)]
    origin: String,

    /// Suite of the mirror
    #[arg(long, default_value = "stable", global = true)]
    suite: String,

    /// Native architecture (default: the host's)
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Do not auto-install Recommends
    #[arg(long, global = true)]
    no_install_recommends: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the record of a package's candidate version
    Show {
        package: String,
        /// Print JSON instead of the control stanza
        #[arg(long)]
        json: bool,
    },
    /// Show installed and candidate versions and their priorities
    Policy { package: String },
    /// Mark packages and report the resulting changes without applying them
    Simulate {
        #[command(subcommand)]
        action: SimulateAction,
    },
    /// Download the candidate .deb or its source package
    Download {
        package: String,
        /// Destination directory
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
        /// Fetch the source package instead of the binary
        #[arg(long)]
        source: bool,
        /// Unpack the source package with dpkg-source
        #[arg(long, requires = "source")]
        unpack: bool,
    },
    /// List the files dpkg installed for a package
    Files { package: String },
    /// Show the changes since the installed version
    Changelog {
        package: String,
        /// URI template with {src_section}, {prefix}, {src_pkg} and {src_ver}
        #[arg(long)]
        uri: Option<String>,
    },
}

#[derive(Subcommand)]
enum SimulateAction {
    Install { packages: Vec<String> },
    Remove {
        packages: Vec<String>,
        /// Also remove configuration files
        #[arg(long)]
        purge: bool,
    },
    /// Upgrade the given packages, or every upgradable package
    Upgrade { packages: Vec<String> },
}

#[derive(Serialize)]
struct ShowOutput {
    package: String,
    version: String,
    architecture: String,
    section: Option<String>,
    installed_size: u64,
    size: u64,
    source: String,
    source_version: String,
    homepage: Option<String>,
    summary: String,
    depends: Vec<String>,
    recommends: Vec<String>,
    provides: Vec<String>,
    origins: Vec<String>,
    uris: Vec<String>,
}

/// Read an index file, decompressing .gz files
fn read_index(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut data = Vec::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(file).read_to_end(&mut data)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut data)?;
    }
    Ok(data)
}

fn open_cache(cli: &Cli) -> Result<Cache> {
    let mut options = CacheOptions {
        install_recommends: !cli.no_install_recommends,
        dpkg_dir: cli.dpkg_dir.clone(),
        ..CacheOptions::default()
    };
    if let Some(arch) = &cli.arch {
        options.native_arch = arch.clone();
    }

    let mut builder = Cache::builder().options(options);
    if cli.status.exists() {
        builder = builder.status(read_index(&cli.status)?);
    } else {
        info!("No status file at {}, assuming nothing is installed", cli.status.display());
    }

    for path in &cli.packages {
        let mut file = PackageFile::archive(&cli.mirror, &cli.origin, &cli.suite, "main");
        file.trusted = true;
        builder = builder.packages(file, read_index(path)?);
    }

    let mut sources = MemorySourceIndex::new();
    for path in &cli.sources {
        sources.parse(&cli.mirror, &read_index(path)?)?;
    }

    let cache = builder.source_index(sources).build()?;
    info!("Loaded {} packages", cache.len());
    Ok(cache)
}

fn show(cache: &Cache, name: &str, json: bool) -> Result<()> {
    let pkg = cache.lookup(name)?;
    let ver = pkg
        .candidate()
        .or_else(|| pkg.installed())
        .with_context(|| format!("{} has no installable version", pkg.name()))?;

    if !json {
        print!("{}", ver.record()?);
        return Ok(());
    }

    let groups = |kinds: &[DepType]| -> Vec<String> {
        ver.get_dependencies(kinds).iter().map(|g| g.to_string()).collect()
    };
    let output = ShowOutput {
        package: pkg.name(),
        version: ver.version().to_string(),
        architecture: ver.architecture().to_string(),
        section: ver.section().map(String::from),
        installed_size: ver.installed_size(),
        size: ver.size(),
        source: ver.source_name()?,
        source_version: ver.source_version()?,
        homepage: ver.homepage()?,
        summary: ver.summary()?,
        depends: groups(&[DepType::PreDepends, DepType::Depends]),
        recommends: groups(&[DepType::Recommends]),
        provides: ver.provides().into_iter().map(String::from).collect(),
        origins: ver.origins().iter().map(|o| o.to_string()).collect(),
        uris: ver.uris()?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn policy(cache: &Cache, name: &str) -> Result<()> {
    let pkg = cache.lookup(name)?;
    let none = || "(none)".to_string();

    println!("{}:", pkg.name());
    println!(
        "  Installed: {}",
        pkg.installed().map_or_else(none, |v| v.version().to_string())
    );
    println!(
        "  Candidate: {}",
        pkg.candidate().map_or_else(none, |v| v.version().to_string())
    );
    println!("  Version table:");
    for ver in pkg.versions().iter() {
        let marker = if ver.is_installed() { "***" } else { "   " };
        println!(" {} {} {}", marker, ver.version(), ver.policy_priority());
        for origin in ver.origins() {
            println!("        {}", origin);
        }
    }
    Ok(())
}

fn lookup_all<'c>(cache: &'c Cache, names: &[String]) -> Result<Vec<Package<'c>>> {
    names.iter().map(|name| Ok(cache.lookup(name)?)).collect()
}

fn simulate(cache: &Cache, action: &SimulateAction) -> Result<()> {
    match action {
        SimulateAction::Install { packages } => {
            for pkg in lookup_all(cache, packages)? {
                pkg.mark_install(true, true, true);
            }
        }
        SimulateAction::Remove { packages, purge } => {
            for pkg in lookup_all(cache, packages)? {
                pkg.mark_delete(true, *purge);
            }
        }
        SimulateAction::Upgrade { packages } if packages.is_empty() => {
            let _change = cache.begin_change();
            for pkg in cache.iter().filter(|p| p.is_upgradable()) {
                pkg.mark_upgrade(false);
            }
        }
        SimulateAction::Upgrade { packages } => {
            for pkg in lookup_all(cache, packages)? {
                pkg.mark_upgrade(true);
            }
        }
    }

    for pkg in cache.changes() {
        let verb = if pkg.marked_delete() {
            "Remove"
        } else if pkg.marked_install() {
            "Install"
        } else if pkg.marked_upgrade() {
            "Upgrade"
        } else if pkg.marked_downgrade() {
            "Downgrade"
        } else if pkg.marked_reinstall() {
            "Reinstall"
        } else {
            continue;
        };
        let target = pkg
            .candidate()
            .filter(|_| !pkg.marked_delete())
            .or_else(|| pkg.installed())
            .map(|v| v.version().to_string())
            .unwrap_or_default();
        println!("{} {} [{}]", verb, pkg.name(), target);
    }

    println!(
        "{} to install, {} to remove, {} broken",
        cache.install_count(),
        cache.delete_count(),
        cache.broken_count()
    );
    println!(
        "Need to get {} bytes; {} bytes of disk space will be used",
        cache.required_download(),
        cache.required_space()
    );

    if cache.broken_count() > 0 {
        let broken: Vec<String> = cache
            .iter()
            .filter(|p| p.is_inst_broken())
            .map(|p| p.name())
            .collect();
        anyhow::bail!("Unmet dependencies: {}", broken.join(", "));
    }
    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn download(cache: &Cache, name: &str, dest: &Path, source: bool, unpack: bool) -> Result<()> {
    let pkg = cache.lookup(name)?;
    let ver = pkg
        .candidate()
        .with_context(|| format!("{} has no candidate version", pkg.name()))?;
    let pb = progress_bar()?;

    let path = if source {
        ver.fetch_source(dest, Some(&pb), unpack)?
    } else {
        ver.fetch_binary(dest, Some(&pb))?
    };
    println!("{}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cache = open_cache(&cli)?;

    match &cli.command {
        Commands::Show { package, json } => show(&cache, package, *json),
        Commands::Policy { package } => policy(&cache, package),
        Commands::Simulate { action } => simulate(&cache, action),
        Commands::Download {
            package,
            dest,
            source,
            unpack,
        } => download(&cache, package, dest, *source, *unpack),
        Commands::Files { package } => {
            for path in cache.lookup(package)?.installed_files()? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Changelog { package, uri } => {
            let pkg = cache.lookup(package)?;
            let cancel = AtomicBool::new(false);
            println!("{}", pkg.get_changelog(uri.as_deref(), Some(&cancel)));
            Ok(())
        }
    }
}
