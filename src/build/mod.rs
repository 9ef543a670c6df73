//! # Build driver for `dm build`.
//!
//! Compiles every selected target with `tsc -b <tsconfig> -listEmittedFiles`
//! and restarts the target's apps when the compile was clean and emitted
//! something.
//!
//! ```text
//! resolve_build_targets(names)
//!   └─ run_bounded(targets, build_concurrency)
//!        └─ RequestContext::run (one per target)
//!             ├─ spawn tsc ── stdout ─┐
//!             │            └─ stderr ─┴─ LineReader ─► classify ─► CompileStats
//!             └─ errors == 0 && files > 0 ─► Restarter::restart(target.apps)
//! totals + elapsed ─► log
//! ```
//!
//! ## Line classification
//! - contains `: error` → counted; the `path(line,col)` prefix is made absolute
//! - starts with `TSFILE:` → counted as an emitted file, not echoed
//! - anything else is echoed

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::Command;

use crate::client::DmClient;
use crate::config::{BuildConfig, BuildTarget};
use crate::context::RequestContext;
use crate::error::DmError;
use crate::executor::run_bounded;
use crate::lines::LineReader;

/// Counters of one compile (or the sum of several).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompileStats {
    pub errors: usize,
    pub files: usize,
    /// Compiler exit code; `None` for totals or a signal-terminated compiler.
    pub exit_code: Option<i32>,
}

impl CompileStats {
    fn add(&mut self, other: &CompileStats) {
        self.errors += other.errors;
        self.files += other.files;
    }

    /// Clean compile that produced output.
    pub fn should_restart(&self) -> bool {
        self.errors == 0 && self.files > 0
    }
}

/// What one compiler output line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A diagnostic, rendered with an absolute file path.
    Error(String),
    Emitted,
    Other,
}

/// Classifies a compiler output line; relative paths resolve against `cwd`.
pub fn classify(line: &str, cwd: &Path) -> OutputLine {
    if line.contains(": error") {
        let rendered = match line.find('(') {
            Some(start) if start > 0 => {
                format!("{}{}", cwd.join(&line[..start]).display(), &line[start..])
            }
            _ => line.to_string(),
        };
        return OutputLine::Error(rendered);
    }
    if line.starts_with("TSFILE:") {
        return OutputLine::Emitted;
    }
    OutputLine::Other
}

async fn scan<R: AsyncRead + Unpin>(stream: Option<R>, cwd: &Path) -> std::io::Result<CompileStats> {
    let mut stats = CompileStats::default();
    let Some(stream) = stream else {
        return Ok(stats);
    };

    let mut reader = LineReader::from_stream(stream);
    while let Some(line) = reader.next().await? {
        match classify(&line, cwd) {
            OutputLine::Error(rendered) => {
                stats.errors += 1;
                println!("{rendered}");
            }
            OutputLine::Emitted => stats.files += 1,
            OutputLine::Other => println!("{line}"),
        }
    }
    reader.dispose();
    Ok(stats)
}

/// Runs the compiler for one build config and tallies its output.
pub async fn compile(build: &BuildConfig, force: bool, cwd: &Path) -> Result<CompileStats, DmError> {
    if !tokio::fs::try_exists(&build.tsc).await.unwrap_or(false) {
        return Err(DmError::user(format!("tsc was not found at: {}", build.tsc.display())));
    }

    let mut cmd = Command::new(&build.tsc);
    cmd.arg("-b").arg(&build.tsconfig).arg("-listEmittedFiles");
    if force {
        cmd.arg("-f");
    }
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(tsc = %build.tsc.display(), tsconfig = %build.tsconfig.display(), force, "compiling");
    let mut child = cmd.spawn()?;
    let (out, err) = tokio::join!(scan(child.stdout.take(), cwd), scan(child.stderr.take(), cwd));
    let status = child.wait().await?;

    let mut stats = out?;
    stats.add(&err?);
    stats.exit_code = status.code();
    Ok(stats)
}

/// Restarts apps after a successful compile.
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart(&self, cwd: &Path, names: &[String]) -> Result<(), DmError>;
}

#[async_trait]
impl Restarter for DmClient {
    async fn restart(&self, cwd: &Path, names: &[String]) -> Result<(), DmError> {
        DmClient::restart(self, cwd, Some(names)).await
    }
}

/// Compiles build targets with bounded parallelism.
pub struct BuildDriver {
    restarter: Arc<dyn Restarter>,
    cwd: PathBuf,
    force: bool,
    limit: usize,
}

impl BuildDriver {
    pub fn new(restarter: Arc<dyn Restarter>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            restarter,
            cwd: cwd.into(),
            force: false,
            limit: 2,
        }
    }

    /// Passes `-f` to the compiler.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Compiler processes allowed at once (0 is treated as 1).
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    async fn build_target(&self, target: &BuildTarget) -> Result<CompileStats, DmError> {
        let stats = compile(&target.build, self.force, &self.cwd).await?;
        tracing::debug!(
            target = %target.name,
            errors = stats.errors,
            files = stats.files,
            exit_code = ?stats.exit_code,
            "compiled"
        );
        if stats.should_restart() && !target.apps.is_empty() {
            tracing::debug!(apps = ?target.apps, "restarting");
            self.restarter.restart(&self.cwd, &target.apps).await?;
        }
        Ok(stats)
    }

    /// Builds every target and returns the totals.
    ///
    /// A failing target is logged; the others still build.
    pub async fn run(&self, targets: &[BuildTarget]) -> CompileStats {
        let totals = Mutex::new(CompileStats::default());
        let started = Instant::now();

        let tasks = targets.iter().map(|target| {
            let totals = &totals;
            move || {
                RequestContext::run(move || async move {
                    match self.build_target(target).await {
                        Ok(stats) => {
                            totals.lock().unwrap_or_else(|p| p.into_inner()).add(&stats);
                            Ok(())
                        }
                        Err(e) => {
                            tracing::error!(target = %target.name, error = %e, "build failed");
                            Err(e)
                        }
                    }
                })
            }
        });
        run_bounded(tasks, self.limit).await;

        let totals = totals.into_inner().unwrap_or_else(|p| p.into_inner());
        tracing::info!(errors = totals.errors, files = totals.files, "build finished");
        tracing::info!(seconds = started.elapsed().as_secs_f64(), "done");
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetKind;

    #[test]
    fn test_classify() {
        let cwd = Path::new("/repo");
        assert_eq!(
            classify("src/a.ts(3,5): error TS2304: Cannot find name 'x'.", cwd),
            OutputLine::Error("/repo/src/a.ts(3,5): error TS2304: Cannot find name 'x'.".into())
        );
        assert_eq!(
            classify("error TS5083: Cannot read file 'tsconfig.json'.", cwd),
            OutputLine::Other
        );
        assert_eq!(classify("TSFILE: /repo/dist/a.js", cwd), OutputLine::Emitted);
        assert_eq!(classify("Found 0 errors.", cwd), OutputLine::Other);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Vec<String>>>);

    #[async_trait]
    impl Restarter for Recorder {
        async fn restart(&self, _cwd: &Path, names: &[String]) -> Result<(), DmError> {
            self.0.lock().unwrap().push(names.to_vec());
            Ok(())
        }
    }

    #[cfg(unix)]
    fn fake_tsc(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn target(name: &str, tsc: PathBuf, apps: &[&str]) -> BuildTarget {
        BuildTarget {
            name: name.into(),
            kind: TargetKind::Project,
            build: BuildConfig {
                tsconfig: PathBuf::from("tsconfig.json"),
                tsc,
            },
            apps: apps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_compile_restarts_and_errors_do_not() {
        let dir = tempfile::tempdir().unwrap();
        let clean = fake_tsc(dir.path(), "clean", "echo 'TSFILE: dist/a.js'\necho 'TSFILE: dist/b.js'");
        let broken = fake_tsc(
            dir.path(),
            "broken",
            "echo 'TSFILE: dist/c.js'\necho 'src/c.ts(1,1): error TS1005: oops' >&2\nexit 2",
        );

        let recorder = Arc::new(Recorder::default());
        let driver = BuildDriver::new(recorder.clone(), dir.path()).limit(2);
        let totals = driver
            .run(&[target("core", clean, &["api", "worker"]), target("extras", broken, &["mailer"])])
            .await;

        assert_eq!(totals.files, 3);
        assert_eq!(totals.errors, 1);
        assert_eq!(*recorder.0.lock().unwrap(), vec![vec!["api".to_string(), "worker".to_string()]]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_force_flag_and_missing_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let flagged = fake_tsc(dir.path(), "args", "case \"$*\" in *' -f'*) echo 'TSFILE: forced' ;; esac");
        let stats = compile(
            &BuildConfig {
                tsconfig: PathBuf::from("tsconfig.json"),
                tsc: flagged,
            },
            true,
            dir.path(),
        )
        .await
        .unwrap();
        assert_eq!(stats.exit_code, Some(0));
        assert_eq!(stats.files, 1);

        let err = compile(
            &BuildConfig {
                tsconfig: PathBuf::from("tsconfig.json"),
                tsc: dir.path().join("missing"),
            },
            false,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("tsc was not found at:"));
    }
}
