mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hashguard_core::{Algorithm, Store, StoreConfig};
use output::{
    CheckOutput, ConfigOutput, DeleteOutput, DigestOutput, GetOutput, LookupOutput, OutputWriter,
    SaveOutput,
};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable naming the store root.
const ROOT_ENV: &str = "HASHGUARD_ROOT";

/// Store root used when neither flag, env var, nor config file names one.
const DEFAULT_ROOT: &str = "./hashguard-store";

/// Hashguard - a content-addressed file store
#[derive(Parser)]
#[command(name = "hashguard")]
#[command(about = "Content-addressed file store keyed by SHA-256 digests", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to HASHGUARD_ROOT env var or ./hashguard-store).
    /// Overrides the config file root and resets scratch to <root>/temporary
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Scratch directory for in-flight uploads
    #[arg(long, global = true)]
    scratch: Option<PathBuf>,

    /// Hash algorithm (sha256 or blake3)
    #[arg(long, global = true)]
    algo: Option<String>,

    /// Config file with key=value settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log each storage step to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its digest
    Save {
        /// File to store, or - for stdin
        path: PathBuf,

        /// Original file name to record (defaults to the path's file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Resolve a digest to the stored file
    Lookup {
        /// Digest of the file
        digest: String,
    },

    /// Output stored content to stdout
    Cat {
        /// Digest of the file
        digest: String,
    },

    /// Copy a stored file into a directory under its stored name
    Get {
        /// Digest of the file
        digest: String,

        /// Destination directory
        dest: PathBuf,
    },

    /// Delete a stored file
    Delete {
        /// Digest of the file
        digest: String,
    },

    /// Compute a digest without storing anything
    Digest {
        /// File to hash, or - for stdin
        path: PathBuf,
    },

    /// Check whether a string is a well-formed digest
    Check {
        /// Candidate digest
        candidate: String,
    },

    /// Show the effective store configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let out = OutputWriter::new(cli.json);
    match run(&cli, &out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = result_code(&err);
            out.write_error(&err, code);
            ExitCode::from(code)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hashguard=debug,hashguard_core=debug"
    } else {
        "hashguard=warn,hashguard_core=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Exit code for a failed command: the store error kind's code, or 1.
fn result_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<hashguard_core::Error>()
        .map(|e| e.kind().result_code())
        .unwrap_or(1)
}

fn run(cli: &Cli, out: &OutputWriter) -> Result<()> {
    let config = load_config(cli)?;
    tracing::debug!(
        root = %config.root.display(),
        scratch = %config.scratch.display(),
        algo = %config.algorithm,
        "Using store"
    );
    let store = Store::new(config).context("Failed to open store")?;

    match &cli.command {
        Commands::Save { path, name } => cmd_save(&store, out, path, name.as_deref()),
        Commands::Lookup { digest } => cmd_lookup(&store, out, digest),
        Commands::Cat { digest } => cmd_cat(&store, out, digest),
        Commands::Get { digest, dest } => cmd_get(&store, out, digest, dest),
        Commands::Delete { digest } => cmd_delete(&store, out, digest),
        Commands::Digest { path } => cmd_digest(&store, out, path),
        Commands::Check { candidate } => cmd_check(&store, out, candidate),
        Commands::Config => cmd_config(&store, out),
    }
}

/// Build the store config: config file, then CLI flags, then env/default root.
fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let env_root = std::env::var_os(ROOT_ENV).map(PathBuf::from);
    let mut config = match (&cli.config, &cli.root) {
        (Some(path), None) => StoreConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        (Some(path), Some(root)) => {
            let file = StoreConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            StoreConfig::new(root)
                .with_algorithm(file.algorithm)
                .with_buffer_size(file.buffer_size)
        }
        (None, root) => StoreConfig::new(
            root.clone()
                .or(env_root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
        ),
    };

    if let Some(scratch) = &cli.scratch {
        config = config.with_scratch(scratch);
    }
    if let Some(algo) = &cli.algo {
        config = config.with_algorithm(Algorithm::parse(algo)?);
    }
    Ok(config)
}

/// Open a file argument, treating `-` as stdin.
fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(io::stdin().lock()))
    } else {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Box::new(file))
    }
}

fn cmd_save(store: &Store, out: &OutputWriter, path: &Path, name: Option<&str>) -> Result<()> {
    let file_name = match name {
        Some(name) => name.to_string(),
        None if path.as_os_str() == "-" => "stdin".to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let reader = open_input(path)?;
    let digest = store
        .save(&file_name, reader)
        .with_context(|| format!("Failed to save {}", path.display()))?;

    let output = SaveOutput {
        success: true,
        result_code: 0,
        digest: digest.clone(),
        source: path.display().to_string(),
    };
    out.write(&output, || format!("{} {}\n", digest, path.display()))
}

fn cmd_lookup(store: &Store, out: &OutputWriter, digest: &str) -> Result<()> {
    let object = store
        .lookup(digest)
        .with_context(|| format!("Failed to look up {}", digest))?;
    let size = object.size()?;

    let output = LookupOutput {
        success: true,
        result_code: 0,
        digest: object.digest().to_string(),
        file_name: object.file_name().to_string(),
        path: object.path().display().to_string(),
        size,
    };
    out.write(&output, || format!("{}\n", object.path().display()))
}

fn cmd_cat(store: &Store, out: &OutputWriter, digest: &str) -> Result<()> {
    if out.is_json() {
        anyhow::bail!("cat writes raw content and has no JSON form");
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    store
        .cat(digest, &mut handle)
        .with_context(|| format!("Failed to output {}", digest))?;
    Ok(())
}

fn cmd_get(store: &Store, out: &OutputWriter, digest: &str, dest: &Path) -> Result<()> {
    let object = store
        .lookup(digest)
        .with_context(|| format!("Failed to look up {}", digest))?;

    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let target = dest.join(object.file_name());
    let file = File::create_new(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let size = object
        .copy_to(file)
        .with_context(|| format!("Failed to copy {} to {}", digest, target.display()))?;

    let output = GetOutput {
        success: true,
        result_code: 0,
        digest: object.digest().to_string(),
        destination: target.display().to_string(),
        size,
    };
    out.write(&output, || format!("{}\n", target.display()))
}

fn cmd_delete(store: &Store, out: &OutputWriter, digest: &str) -> Result<()> {
    store
        .remove(digest)
        .with_context(|| format!("Failed to delete {}", digest))?;

    let output = DeleteOutput {
        success: true,
        result_code: 0,
        digest: digest.to_string(),
    };
    out.write(&output, || format!("Deleted {}\n", digest))
}

fn cmd_digest(store: &Store, out: &OutputWriter, path: &Path) -> Result<()> {
    let reader = open_input(path)?;
    let digest = store
        .digest_reader(reader)
        .with_context(|| format!("Failed to hash {}", path.display()))?;

    let output = DigestOutput {
        success: true,
        result_code: 0,
        digest: digest.clone(),
        algorithm: store.algorithm().to_string(),
        source: path.display().to_string(),
    };
    out.write(&output, || format!("{} {}\n", digest, path.display()))
}

fn cmd_check(store: &Store, out: &OutputWriter, candidate: &str) -> Result<()> {
    hashguard_core::validate(store.algorithm(), candidate)
        .with_context(|| format!("Rejected {:?}", candidate))?;

    let output = CheckOutput {
        success: true,
        result_code: 0,
        candidate: candidate.to_string(),
        well_formed: true,
        expected_length: store.algorithm().digest_len(),
    };
    out.write(&output, || "ok\n".to_string())
}

fn cmd_config(store: &Store, out: &OutputWriter) -> Result<()> {
    let config = store.config();
    let output = ConfigOutput {
        success: true,
        result_code: 0,
        config: config.clone(),
    };
    out.write(&output, || {
        format!(
            "root={}\nscratch={}\nalgo={}\nbuffer_size={}\n",
            config.root.display(),
            config.scratch.display(),
            config.algorithm,
            config.buffer_size
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashguard_core::{Error, ErrorKind};
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["hashguard"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = parse(&["lookup", "abc", "--root", "/data", "--json"]);
        assert_eq!(cli.root, Some(PathBuf::from("/data")));
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Lookup { ref digest } if digest == "abc"));
    }

    #[test]
    fn test_load_config_flags() {
        let cli = parse(&["--root", "/data", "--algo", "blake3", "--scratch", "/tmp/s", "config"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.root, PathBuf::from("/data"));
        assert_eq!(config.scratch, PathBuf::from("/tmp/s"));
        assert_eq!(config.algorithm, Algorithm::Blake3);
    }

    #[test]
    fn test_load_config_file_with_root_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hashguard.conf");
        fs::write(&path, "root=files\nscratch=/tmp/elsewhere\nalgo=blake3\n").unwrap();
        let path_str = path.to_str().unwrap();

        let config = load_config(&parse(&["--config", path_str, "config"])).unwrap();
        assert_eq!(config.root, temp_dir.path().join("files"));
        assert_eq!(config.scratch, PathBuf::from("/tmp/elsewhere"));

        let config =
            load_config(&parse(&["--config", path_str, "--root", "/data", "config"])).unwrap();
        assert_eq!(config.root, PathBuf::from("/data"));
        assert_eq!(config.scratch, PathBuf::from("/data/temporary"));
        assert_eq!(config.algorithm, Algorithm::Blake3);
    }

    #[test]
    fn test_load_config_bad_algo() {
        let cli = parse(&["--root", "/data", "--algo", "md5", "config"]);
        let err = load_config(&cli).unwrap_err();
        assert_eq!(result_code(&err), ErrorKind::Config.result_code());
    }

    #[test]
    fn test_result_code_through_context() {
        let err = anyhow::Error::new(Error::not_found("abc")).context("Failed to delete abc");
        assert_eq!(result_code(&err), ErrorKind::NotFound.result_code());
        assert_eq!(result_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_save_get_delete_commands() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("store")).unwrap();
        let out = OutputWriter::new(true);

        let source = temp_dir.path().join("fake-text-stream.txt");
        fs::write(&source, b"some initial text data").unwrap();
        cmd_save(&store, &out, &source, None).unwrap();

        let digest = store.digest_reader(&b"some initial text data"[..]).unwrap();
        let dest = temp_dir.path().join("download");
        cmd_get(&store, &out, digest.as_str(), &dest).unwrap();
        let fetched = dest.join(format!("{}.txt", digest));
        assert_eq!(fs::read(&fetched).unwrap(), b"some initial text data");

        // Refuses to overwrite an earlier download.
        assert!(cmd_get(&store, &out, digest.as_str(), &dest).is_err());

        let err = cmd_save(&store, &out, &source, None).unwrap_err();
        assert_eq!(result_code(&err), ErrorKind::DuplicateContent.result_code());

        cmd_delete(&store, &out, digest.as_str()).unwrap();
        let err = cmd_delete(&store, &out, digest.as_str()).unwrap_err();
        assert_eq!(result_code(&err), ErrorKind::NotFound.result_code());
    }

    #[test]
    fn test_check_command() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path()).unwrap();
        let out = OutputWriter::new(true);

        cmd_check(&store, &out, &"x".repeat(64)).unwrap();
        let err = cmd_check(&store, &out, "/etc/passwd").unwrap_err();
        assert_eq!(result_code(&err), ErrorKind::InvalidDigest.result_code());
    }
}
