use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "vntldev: Ren'Py archive toolbox", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack a directory into an RPA archive
    Pack {
        out: PathBuf,
        source: PathBuf,

        /// archive version, 2 or 3
        #[arg(long = "rpa-version", default_value_t = 3)]
        rpa_version: u8,

        /// 32-bit hex obfuscation key (version 3 only)
        #[arg(long = "key")]
        key_hex: Option<String>,

        /// filler bytes between header and first file
        #[arg(long, default_value_t = 0)]
        padding: u64,
    },

    /// List archive contents
    List {
        archive: PathBuf,

        /// data file when ARCHIVE is a version 1 .rpi index
        #[arg(long)]
        data: Option<PathBuf>,

        /// override the key stored in the header
        #[arg(long = "key")]
        key_hex: Option<String>,
    },

    /// Extract archive to destination
    Extract {
        archive: PathBuf,
        dest: PathBuf,

        #[arg(long)]
        data: Option<PathBuf>,

        #[arg(long = "key")]
        key_hex: Option<String>,
    },

    /// Stream one entry (or a range of it) to stdout
    Cat {
        archive: PathBuf,
        name: String,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long)]
        len: Option<u64>,
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long = "key")]
        key_hex: Option<String>,
    },

    /// Write one entry to an output path
    Get {
        archive: PathBuf,
        name: String,
        out: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long = "key")]
        key_hex: Option<String>,
    },

    /// Show the header of an archive
    Header { archive: PathBuf },
}
