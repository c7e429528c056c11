use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vntl_core::policy::Limits;

/// Command line and environment configuration of the job server.
#[derive(Parser, Debug, Clone)]
#[command(name = "vntl-server", version, about = "Ren'Py job workspace server")]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "VNTL_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Directory holding one subdirectory per job. Defaults to
    /// `$TMPDIR/renpy-web-tool-jobs`.
    #[arg(long, env = "JOB_ROOT")]
    pub job_root: Option<PathBuf>,

    /// Idle time after which a job and its files are deleted.
    #[arg(long, env = "JOB_TTL_SECONDS", default_value_t = 3600)]
    pub job_ttl_seconds: u64,

    #[arg(long, env = "VNTL_SWEEP_INTERVAL_SECONDS", default_value_t = 300)]
    pub sweep_interval_seconds: u64,

    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 11111)]
    pub max_upload_mb: u64,

    /// Largest file served or accepted by the text endpoints.
    #[arg(long, env = "VNTL_MAX_TEXT_KB", default_value_t = 2048)]
    pub max_text_kb: u64,

    /// Comma separated list of origins, or `*`.
    #[arg(long, env = "CORS_ALLOW_ORIGINS", default_value = "*")]
    pub cors_allow_origins: String,

    /// Decompiler executable, invoked as `<program> <file>`.
    #[arg(long, env = "VNTL_DECOMPILER", default_value = "unrpyc")]
    pub decompiler: String,

    #[arg(long, env = "VNTL_DECOMPILE_TIMEOUT_SECONDS", default_value_t = 300)]
    pub decompile_timeout_seconds: u64,
}

impl ServerArgs {
    pub fn job_root(&self) -> PathBuf {
        self.job_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("renpy-web-tool-jobs"))
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        // tokio's interval panics on a zero period
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    pub fn decompile_timeout(&self) -> Duration {
        Duration::from_secs(self.decompile_timeout_seconds)
    }

    pub fn limits(&self) -> Limits {
        Limits::from_units(self.max_text_kb, self.max_upload_mb)
    }

    /// `None` means any origin.
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .cors_allow_origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            None
        } else {
            Some(origins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_origin_list() {
        let args = ServerArgs::parse_from(["vntl-server"]);
        assert_eq!(args.bind.port(), 8000);
        assert_eq!(args.job_ttl(), Duration::from_secs(3600));
        assert_eq!(args.limits().max_text_bytes, 2048 * 1024);
        assert!(args.job_root().ends_with("renpy-web-tool-jobs"));
        assert_eq!(args.cors_origins(), None);

        let args = ServerArgs::parse_from([
            "vntl-server",
            "--cors-allow-origins",
            "http://a.test, http://b.test",
            "--sweep-interval-seconds",
            "0",
        ]);
        assert_eq!(
            args.cors_origins().unwrap(),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(args.sweep_interval(), Duration::from_secs(1));
    }
}
