use crate::error::{Result, VntlError};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecompileOptions {
    pub try_harder: bool,
}

/// Turns one compiled script into source text.
pub trait Decompiler: Send + Sync {
    fn decompile(&self, source: &Path, options: DecompileOptions) -> Result<String>;
}

/// Name of the text file produced for a compiled script at `rel`:
/// `.rpymc` becomes `.rpym`, everything else `.rpy`.
pub fn decompiled_name(rel: &Path) -> PathBuf {
    let is_module = rel
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("rpymc"))
        .unwrap_or(false);
    rel.with_extension(if is_module { "rpym" } else { "rpy" })
}

/// Runs an external decompiler (unrpyc by default) on a private copy of the
/// input and reads back the text it writes next to that copy.
#[derive(Clone, Debug)]
pub struct ExternalDecompiler {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for ExternalDecompiler {
    fn default() -> Self {
        Self::new("unrpyc")
    }
}

impl ExternalDecompiler {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
    const POLL: Duration = Duration::from_millis(25);

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Arguments placed before the input path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Decompiler for ExternalDecompiler {
    fn decompile(&self, source: &Path, options: DecompileOptions) -> Result<String> {
        let work = tempfile::tempdir()?;
        // the tool keys off the extension, so renamed inputs get a proper one
        let ext = match source.extension().and_then(|e| e.to_str()) {
            Some(e) if e.eq_ignore_ascii_case("rpymc") => "rpymc",
            _ => "rpyc",
        };
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        let copy = work.path().join(format!("{stem}.{ext}"));
        fs::copy(source, &copy)?;
        let log_path = work.path().join("stderr.log");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if options.try_harder {
            cmd.arg("--try-harder");
        }
        cmd.arg(&copy)
            .current_dir(work.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(File::create(&log_path)?));

        let mut child = cmd.spawn().map_err(|e| {
            VntlError::TransformationFailed(format!("cannot start {}: {e}", self.program))
        })?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VntlError::TransformationFailed(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )));
            }
            std::thread::sleep(Self::POLL);
        };

        if !status.success() {
            let log = fs::read_to_string(&log_path).unwrap_or_default();
            let tail = log.lines().last().unwrap_or("").trim().to_string();
            return Err(VntlError::TransformationFailed(format!(
                "{} exited with {status}{}{tail}",
                self.program,
                if tail.is_empty() { "" } else { ": " }
            )));
        }

        let produced = decompiled_name(&copy);
        let bytes = fs::read(&produced).map_err(|_| {
            VntlError::TransformationFailed(format!(
                "{} produced no {}",
                self.program,
                produced
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ))
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names() {
        assert_eq!(decompiled_name(Path::new("a/b.rpyc")), PathBuf::from("a/b.rpy"));
        assert_eq!(decompiled_name(Path::new("m.rpymc")), PathBuf::from("m.rpym"));
        assert_eq!(decompiled_name(Path::new("odd.bin")), PathBuf::from("odd.rpy"));
    }

    #[test]
    fn missing_program_is_a_transformation_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("x.rpyc");
        fs::write(&src, b"RENPY RPC2").unwrap();
        let err = ExternalDecompiler::new("definitely-not-a-real-decompiler-binary")
            .decompile(&src, DecompileOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "transformation_failed");
    }

    #[cfg(unix)]
    #[test]
    fn runs_command_and_reads_result() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("x.rpyc");
        fs::write(&src, b"RENPY RPC2").unwrap();

        // $0 is the copied input; strip the trailing `c` to get the .rpy path
        let ok = ExternalDecompiler::new("sh").with_args(["-c", r#"printf decompiled > "${0%c}""#]);
        assert_eq!(
            ok.decompile(&src, DecompileOptions::default()).unwrap(),
            "decompiled"
        );

        let failing = ExternalDecompiler::new("sh").with_args(["-c", "echo boom >&2; exit 3"]);
        let err = failing
            .decompile(&src, DecompileOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("boom"), "{err}");

        let slow = ExternalDecompiler::new("sh")
            .with_args(["-c", "sleep 5"])
            .with_timeout(Duration::from_millis(100));
        let err = slow.decompile(&src, DecompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
