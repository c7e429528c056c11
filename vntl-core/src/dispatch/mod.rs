//! Processing modes and the classification of input files.

pub mod decompile;
pub mod runner;

use crate::container::header::{Version, sniff};
use crate::domain::Area;
use crate::error::{Result, VntlError};
use crate::pack::writer::PackParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

pub use decompile::{DecompileOptions, Decompiler, ExternalDecompiler};
pub use runner::Dispatcher;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Auto,
    Decompile,
    ExtractRpa,
    ExtractRpi,
    PackRpa,
}

impl ModeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeKind::Auto => "auto",
            ModeKind::Decompile => "decompile",
            ModeKind::ExtractRpa => "extract_rpa",
            ModeKind::ExtractRpi => "extract_rpi",
            ModeKind::PackRpa => "pack_rpa",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeKind {
    type Err = VntlError;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "auto" => ModeKind::Auto,
            "decompile" => ModeKind::Decompile,
            "extract_rpa" => ModeKind::ExtractRpa,
            "extract_rpi" => ModeKind::ExtractRpi,
            "pack_rpa" => ModeKind::PackRpa,
            other => return Err(VntlError::invalid(format!("unknown mode {other:?}"))),
        })
    }
}

/// Validated parameters of a pack run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackRequest {
    pub source_where: Area,
    /// Directory inside `source_where`; empty means the whole area.
    pub source_path: String,
    pub params: PackParams,
}

impl PackRequest {
    pub const DEFAULT_NAME: &'static str = "packed.rpa";
    pub const DEFAULT_KEY_HEX: &'static str = "0xDEADBEEF";

    pub fn new(
        source_where: Area,
        source_path: impl Into<String>,
        name: &str,
        version: u8,
        key_hex: Option<&str>,
        padding: u64,
    ) -> Result<Self> {
        let params = PackParams::new(version, name, key_hex, padding)?;
        Ok(Self {
            source_where,
            source_path: source_path.into(),
            params,
        })
    }
}

/// One processing request. Payloads are validated when the request is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessRequest {
    Auto { try_harder: bool },
    Decompile { try_harder: bool },
    ExtractRpa,
    ExtractRpi,
    PackRpa(PackRequest),
}

impl ProcessRequest {
    pub fn mode(&self) -> ModeKind {
        match self {
            ProcessRequest::Auto { .. } => ModeKind::Auto,
            ProcessRequest::Decompile { .. } => ModeKind::Decompile,
            ProcessRequest::ExtractRpa => ModeKind::ExtractRpa,
            ProcessRequest::ExtractRpi => ModeKind::ExtractRpi,
            ProcessRequest::PackRpa(_) => ModeKind::PackRpa,
        }
    }

    /// Build a request for `mode`; `pack` is only consulted for `pack_rpa`.
    pub fn for_mode(
        mode: ModeKind,
        try_harder: bool,
        pack: impl FnOnce() -> Result<PackRequest>,
    ) -> Result<Self> {
        Ok(match mode {
            ModeKind::Auto => ProcessRequest::Auto { try_harder },
            ModeKind::Decompile => ProcessRequest::Decompile { try_harder },
            ModeKind::ExtractRpa => ProcessRequest::ExtractRpa,
            ModeKind::ExtractRpi => ProcessRequest::ExtractRpi,
            ModeKind::PackRpa => ProcessRequest::PackRpa(pack()?),
        })
    }
}

pub const BYTECODE_MAGIC: &[u8] = b"RENPY RPC2";

/// What an input file is, as far as the dispatcher is concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileClass {
    Bytecode,
    Archive(Version),
    /// Version 1 `.rpi` index.
    Index,
    /// Headerless `.rpa` that belongs to a sibling `.rpi`.
    DataFile,
    Other,
}

fn has_ext(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Classify by extension and leading signature. Unreadable files are `Other`.
pub fn classify(path: &Path) -> FileClass {
    if has_ext(path, &["rpyc", "rpymc"]) {
        return FileClass::Bytecode;
    }

    let mut head = [0u8; 16];
    let n = File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .unwrap_or(0);
    let head = &head[..n];

    if head.starts_with(BYTECODE_MAGIC) {
        return FileClass::Bytecode;
    }
    if let Some(v) = sniff(head) {
        return FileClass::Archive(v);
    }
    if has_ext(path, &["rpi"]) {
        return FileClass::Index;
    }
    if has_ext(path, &["rpa"]) && path.with_extension("rpi").is_file() {
        return FileClass::DataFile;
    }
    FileClass::Other
}
