use anyhow::Result;
use clap::{Parser, Subcommand};
use indexv5::areas::repository::Repository;
use indexv5::commands::convert::ConvertOptions;
use indexv5::commands::ls_files::LsFilesOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "indexv5",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "Convert git index files to the version 5 format",
    long_about = "This tool reads a version 2 or 3 git index, converts it into the \
    hierarchical version 5 layout with per-record CRC32 checks, \
    and reads version 5 files back for listing and verification.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "GIT_DIR",
        default_value = ".git",
        help = "The repository metadata directory"
    )]
    git_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "convert",
        about = "Convert a legacy index to version 5",
        long_about = "This command reads a version 2 or 3 index and writes it in version 5 format. \
        The output is written to a lock file, read back and compared against the input, \
        and only then moved into place."
    )]
    Convert {
        #[arg(long, env = "GIT_INDEX_FILE", help = "The legacy index to read")]
        input: Option<PathBuf>,
        #[arg(long, help = "Where to write the version 5 index")]
        output: Option<PathBuf>,
        #[arg(short = 'H', long, help = "Print the legacy header")]
        header: bool,
        #[arg(short = 'i', long, help = "Print the legacy entries")]
        entries: bool,
        #[arg(short = 'c', long, help = "Print the cache-tree data")]
        cache_tree: bool,
        #[arg(short = 'u', long, help = "Print the resolve-undo data")]
        resolve_undo: bool,
        #[arg(long, help = "Do not read the written index back before replacing the output")]
        no_verify: bool,
    },
    #[command(
        name = "ls-files",
        about = "List the contents of a version 5 index"
    )]
    LsFiles {
        #[arg(long, help = "The version 5 index to read")]
        file: Option<PathBuf>,
        #[arg(short = 'H', long, help = "Print the header")]
        header: bool,
        #[arg(short, long, help = "Print mode, object id, stage and stat data of every file")]
        verbose: bool,
        #[arg(short, long, help = "Print the directory records")]
        directories: bool,
        #[arg(short = 'u', long, help = "Print the conflict and resolve-undo records")]
        conflicts: bool,
    },
    #[command(
        name = "verify",
        about = "Check a version 5 index against its legacy index",
        long_about = "This command reads both indexes and reports whether the version 5 index \
        holds exactly what converting the legacy index produces. It exits with an error on mismatch."
    )]
    Verify {
        #[arg(long, env = "GIT_INDEX_FILE", help = "The legacy index to read")]
        input: Option<PathBuf>,
        #[arg(long, help = "The version 5 index to read")]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let repository = Repository::new(&cli.git_dir, Box::new(std::io::stdout()));

    match cli.command {
        Commands::Convert {
            input,
            output,
            header,
            entries,
            cache_tree,
            resolve_undo,
            no_verify,
        } => {
            let options = ConvertOptions {
                input,
                output,
                header,
                entries,
                cache_tree,
                resolve_undo,
                no_verify,
            };
            repository.convert(&options)?;
        }
        Commands::LsFiles {
            file,
            header,
            verbose,
            directories,
            conflicts,
        } => {
            let options = LsFilesOptions {
                file,
                header,
                verbose,
                directories,
                conflicts,
            };
            repository.ls_files(&options)?
        }
        Commands::Verify { input, file } => {
            repository.verify(input.as_deref(), file.as_deref())?
        }
    }

    Ok(())
}
