//! CLI front-end: argument parsing, filesystem traversal, and terminal
//! output only — every behavior that matters lives in `zpaq::commands`.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use byte_unit::Byte;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use zpaq::config::{Config, Until};
use zpaq::crypt::{self, CryptReader, CryptWriter, SALT_LEN};

/// Incremental, deduplicating, journaling archiver.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Archive file path.
    ///
    /// Required for all usage, except --completions.
    #[arg(required_unless_present = "completions")]
    archive: Option<PathBuf>,

    /// Emit a shell completion script and exit.
    #[arg(long)]
    completions: Option<Shell>,

    /// Number of worker threads (0 = all available).
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// log2 fragment granularity (0..19).
    #[arg(long, default_value_t = 6)]
    fragment_log: u8,

    /// log2 data-block-size bump over 1 MiB.
    #[arg(long, default_value_t = 0)]
    block_log: u8,

    /// Restrict to files as of this version number.
    #[arg(long)]
    until_version: Option<u32>,

    /// Restrict to files as of this date (`YYYYMMDDHHMMSS`).
    #[arg(long)]
    until_date: Option<u64>,

    /// Encrypt/decrypt the archive with this password. Out-of-scope
    /// interactive masked prompting is left to the caller's shell;
    /// pass `-` to read one line from stdin instead.
    #[arg(long)]
    password: Option<String>,

    /// Omit per-fragment size-table footers in data blocks.
    #[arg(long)]
    fragile: bool,

    /// Silence progress output.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append a new version containing the given files.
    Add {
        /// Files to add, by path on disk. The archive name recorded
        /// is the path as given.
        files: Vec<PathBuf>,
        /// Version date (`YYYYMMDDHHMMSS` UTC). Wall-clock timestamping
        /// is left to the caller to supply.
        #[arg(long)]
        date: u64,
    },
    /// Materialise files from the archive into a destination directory.
    Extract {
        #[arg(long, default_value = "zpaq-extract")]
        dest: PathBuf,
    },
    /// Append a version that logically removes the given archive names.
    Delete {
        /// Archive-recorded names to delete, not filesystem paths.
        names: Vec<String>,
        #[arg(long)]
        date: u64,
    },
    /// Enumerate versions and files.
    List,
    /// Verify structure and fragment hashes.
    Test,
    /// Rewrite the archive keeping only blocks reachable at the
    /// current `--until` bound.
    Purge {
        output: PathBuf,
        #[arg(long)]
        date: u64,
    },
}

fn config_from_args(args: &Args) -> Config {
    Config {
        threads: args.threads,
        fragment_log: args.fragment_log,
        block_log: args.block_log,
        password: args.password.clone().map(Zeroizing::new),
        until: match (args.until_version, args.until_date) {
            (Some(v), _) => Until::Version(v),
            (None, Some(d)) => Until::Date(d),
            (None, None) => Until::Latest,
        },
        fragile: args.fragile,
        ..Config::default()
    }
}

/// Read the archive file from disk, transparently decrypting it if
/// `config.password` is set (salt followed by an AES-256-CTR stream).
fn read_archive(path: &Path, config: &Config) -> std::io::Result<Vec<u8>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut raw = fs::read(path)?;
    if let Some(password) = &config.password {
        if raw.len() < SALT_LEN {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "archive shorter than salt"));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[..SALT_LEN]);
        let key = crypt::derive_key(password, &salt).map_err(zpaq::ArchiveError::from)?;
        let mut reader = CryptReader::new(&raw[SALT_LEN..], &*key);
        let mut plain = Vec::new();
        reader.read_to_end(&mut plain)?;
        raw = plain;
    }
    Ok(raw)
}

/// Write archive bytes back to disk, transparently encrypting them if
/// `config.password` is set, generating a fresh salt each write.
fn write_archive(path: &Path, config: &Config, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(password) = &config.password {
        let salt = crypt::generate_salt();
        let key = crypt::derive_key(password, &salt).map_err(zpaq::ArchiveError::from)?;
        let mut out = Vec::with_capacity(SALT_LEN + bytes.len());
        out.extend_from_slice(&salt);
        let mut writer = CryptWriter::new(&mut out, &key);
        writer.write_all(bytes)?;
        drop(writer);
        fs::write(path, &out)
    } else {
        fs::write(path, bytes)
    }
}

fn progress_bar(quiet: bool, len: u64) -> ProgressBar {
    if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
            pb.set_style(style);
        }
        pb
    }
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zpaq=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    if let Some(shell) = args.completions {
        let mut cmd = Args::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    let config = config_from_args(&args);
    let Some(cmd) = &args.cmd else {
        tracing::error!("a subcommand is required unless --completions is given");
        return ExitCode::FAILURE;
    };

    let result = match cmd {
        Command::Add { files, date } => run_add(&args, &config, files, *date),
        Command::Delete { names, date } => run_delete(&args, &config, names, *date),
        Command::Extract { dest } => run_extract(&args, &config, dest),
        Command::List => run_list(&args, &config),
        Command::Test => run_test(&args, &config),
        Command::Purge { output, date } => run_purge(&args, &config, output, *date),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn archive_path(args: &Args) -> &Path {
    args.archive.as_deref().expect("clap enforces archive is present unless --completions is given")
}

fn run_add(args: &Args, config: &Config, files: &[PathBuf], date: u64) -> Result<(), String> {
    let parts = read_archive(archive_path(args), config).map_err(|e| e.to_string())?;
    let parts = if parts.is_empty() { Vec::new() } else { vec![parts] };

    let mut inputs = Vec::with_capacity(files.len());
    let pb = progress_bar(args.quiet, files.len() as u64);
    for path in files {
        let bytes = fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        inputs.push((path.display().to_string(), bytes));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let outcome = zpaq::commands::add(config, parts, &inputs, date).map_err(|e| e.to_string())?;
    write_archive(archive_path(args), config, &outcome.bytes).map_err(|e| e.to_string())?;
    if !args.quiet {
        println!("{} version {}", style("added").green().bold(), outcome.version);
    }
    Ok(())
}

fn run_delete(args: &Args, config: &Config, names: &[String], date: u64) -> Result<(), String> {
    let parts = read_archive(archive_path(args), config).map_err(|e| e.to_string())?;
    let parts = if parts.is_empty() { Vec::new() } else { vec![parts] };

    let outcome = zpaq::commands::delete(parts, names, date).map_err(|e| e.to_string())?;
    write_archive(archive_path(args), config, &outcome.bytes).map_err(|e| e.to_string())?;
    if !args.quiet {
        println!("{} version {}", style("deleted").green().bold(), outcome.version);
    }
    Ok(())
}

/// Turn a recorded archive name (which may be an absolute path, since
/// `add` records names verbatim as given on the command line) into a
/// path relative to the extraction destination: root and `..`
/// components are dropped so `extract --dest` always writes under
/// `dest`, never outside it.
fn sanitize_relative(name: &str) -> PathBuf {
    use std::path::Component;
    Path::new(name)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

fn run_extract(args: &Args, config: &Config, dest: &Path) -> Result<(), String> {
    let parts = read_archive(archive_path(args), config).map_err(|e| e.to_string())?;
    let outcome = zpaq::commands::extract(config, vec![parts]).map_err(|e| e.to_string())?;

    let pb = progress_bar(args.quiet, outcome.files.len() as u64);
    let mut failures = 0usize;
    for (name, result) in outcome.files {
        pb.inc(1);
        match result {
            Ok(bytes) => {
                let out_path = dest.join(sanitize_relative(&name));
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                fs::write(&out_path, &bytes).map_err(|e| e.to_string())?;
                if !args.quiet {
                    pb.println(format!("{:>10} {name}", style("extracted").blue().bold()));
                }
            }
            Err(e) => {
                failures += 1;
                pb.println(format!("{:>10} {name}: {e}", style("failed").red().bold()));
            }
        }
    }
    pb.finish_and_clear();
    if failures > 0 {
        return Err(format!("{failures} file(s) failed to extract"));
    }
    Ok(())
}

fn run_list(args: &Args, config: &Config) -> Result<(), String> {
    let parts = read_archive(archive_path(args), config).map_err(|e| e.to_string())?;
    let entries = zpaq::commands::list(config, vec![parts]).map_err(|e| e.to_string())?;
    for entry in entries {
        if args.quiet {
            println!("{}", entry.name);
        } else {
            let size = if entry.size < 0 {
                "unknown".to_string()
            } else {
                Byte::from_bytes(entry.size as u128).get_appropriate_unit(false).to_string()
            };
            println!("{:>10} v{:<5} {}", size, entry.version, entry.name);
        }
    }
    Ok(())
}

fn run_test(args: &Args, config: &Config) -> Result<(), String> {
    let parts = read_archive(archive_path(args), config).map_err(|e| e.to_string())?;
    let outcome = zpaq::commands::test(config, vec![parts]).map_err(|e| e.to_string())?;
    if outcome.passed() {
        if !args.quiet {
            println!("{}", style("ok").green().bold());
        }
        Ok(())
    } else {
        for id in &outcome.bad_fragments {
            eprintln!("{:>10} fragment {id}", style("corrupt").red().bold());
        }
        Err(format!("{} fragment(s) failed verification", outcome.bad_fragments.len()))
    }
}

fn run_purge(args: &Args, config: &Config, output: &Path, date: u64) -> Result<(), String> {
    let parts = read_archive(archive_path(args), config).map_err(|e| e.to_string())?;
    let outcome = zpaq::commands::purge(config, vec![parts], date).map_err(|e| e.to_string())?;
    write_archive(output, config, &outcome.bytes).map_err(|e| e.to_string())?;
    if !args.quiet {
        println!("{} -> {}", style("purged").green().bold(), output.display());
    }
    Ok(())
}
