use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use fwstamp::commands::{
    checksum_command, init_project_command, inspect_command, ledger_command,
    next_version_command, patch_command, project_info_command, prune_command, publish_command,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Post-build metadata stamping and release versioning for firmware images.
///
/// This CLI is a thin wrapper around `fwstamp-core` (exposed in code as `fwstamp_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "fwstamp",
    version,
    about = "Stamp build metadata into firmware images and track release versions",
    long_about = None
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv). Without it, RUST_LOG is honoured.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new project at the given root.
    ///
    /// This will:
    /// - Create a `.fwstamp` metadata directory and the publish directory.
    /// - Write a `.fwstamp/stamp.json` config file.
    /// - Read field addresses from the info file when a toolchain is given.
    Init {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional project name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,

        /// Compiler family of the info file (iar or mdk).
        #[arg(long)]
        toolchain: Option<String>,

        /// Image load address, e.g. 0x08000000.
        #[arg(long)]
        base_address: Option<String>,

        /// Source file declaring the metadata variables.
        #[arg(long)]
        info_file: Option<String>,
    },

    /// Show project configuration and resolved field offsets.
    Info {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Write revision id, file size, checksum and hash slot into an image.
    Patch {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Compiled image to patch in place.
        #[arg(long)]
        image: String,

        /// Revision id (hex). Defaults to the git HEAD commit.
        #[arg(long)]
        revision: Option<String>,

        /// Do not copy the image to `<name>_backup<ext>` first.
        #[arg(long, default_value_t = false)]
        no_backup: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Compute an image's checksum and compare it with the stored value.
    Checksum {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        image: String,

        /// Fail when the stored checksum does not match.
        #[arg(long, default_value_t = false)]
        verify: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Read back the metadata fields stored in an image.
    Inspect {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        image: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Compute the next release version from the source and the publish directory.
    NextVersion {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Current version (e.g. V1.0.0.0). Defaults to the info file's declaration.
        #[arg(long)]
        current: Option<String>,

        /// Branch whose releases are considered. Defaults to the git branch.
        #[arg(long)]
        branch: Option<String>,

        /// Write the new version back into the info file.
        #[arg(long, default_value_t = false)]
        write: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Copy a patched image into the publish directory under its release name.
    Publish {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        image: String,

        /// Revision id (hex). Defaults to the git HEAD commit.
        #[arg(long)]
        revision: Option<String>,

        /// Release version. Defaults to the info file's declaration.
        #[arg(long = "release")]
        version: Option<String>,

        /// Branch name. Defaults to the git branch, then `main`.
        #[arg(long)]
        branch: Option<String>,

        /// Build configuration name appended to the filename (e.g. Release).
        #[arg(long)]
        config_name: Option<String>,

        /// Append a `YYYYmmdd_HHMMSS` timestamp to the filename.
        #[arg(long, default_value_t = false)]
        timestamp: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List published images, newest version first.
    Ledger {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Only show images from this branch.
        #[arg(long)]
        branch: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Delete all but the newest published images.
    Prune {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Number of images to keep.
        #[arg(long)]
        keep: usize,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Init { root, name, toolchain, base_address, info_file } => {
            init_project_command(&root, name, toolchain, base_address, info_file)?
        }
        Command::Info { root, json } => project_info_command(&root, json)?,
        Command::Patch { root, image, revision, no_backup, json } => {
            patch_command(&root, &image, revision, no_backup, json)?;
        }
        Command::Checksum { root, image, verify, json } => {
            checksum_command(&root, &image, verify, json)?;
        }
        Command::Inspect { root, image, json } => {
            inspect_command(&root, &image, json)?;
        }
        Command::NextVersion { root, current, branch, write, json } => {
            next_version_command(&root, current, branch, write, json)?;
        }
        Command::Publish { root, image, revision, version, branch, config_name, timestamp, json } => {
            publish_command(&root, &image, revision, version, branch, config_name, timestamp, json)?;
        }
        Command::Ledger { root, branch, json } => {
            ledger_command(&root, branch, json)?;
        }
        Command::Prune { root, keep, json } => {
            prune_command(&root, keep, json)?;
        }
    }

    Ok(())
}
