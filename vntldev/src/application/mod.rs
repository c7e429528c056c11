pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use vntl_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            out,
            source,
            rpa_version,
            key_hex,
            padding,
        } => handlers::handle_pack(out, source, rpa_version, key_hex, padding),
        Commands::List {
            archive,
            data,
            key_hex,
        } => handlers::handle_list(archive, data, key_hex),
        Commands::Extract {
            archive,
            dest,
            data,
            key_hex,
        } => handlers::handle_extract(archive, dest, data, key_hex),
        Commands::Cat {
            archive,
            name,
            start,
            len,
            data,
            key_hex,
        } => handlers::handle_cat(archive, name, start, len, data, key_hex),
        Commands::Get {
            archive,
            name,
            out,
            data,
            key_hex,
        } => handlers::handle_get(archive, name, out, data, key_hex),
        Commands::Header { archive } => handlers::handle_header(archive),
    }
}
