use crate::traits::{ConversionRequest, ConversionTool, ToolRun};
use crate::types::{ConversionResult, DayNewsError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs an `ebook-convert`-compatible program:
/// `<program> <input> <output> <flags...>`
pub struct EbookConvert {
    program: PathBuf,
}

impl EbookConvert {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ConversionTool for EbookConvert {
    fn tool_name(&self) -> String {
        self.program.display().to_string()
    }

    async fn run(&self, request: &ConversionRequest) -> Result<ToolRun> {
        let mut command = Command::new(&self.program);
        command
            .arg(&request.input_path)
            .arg(&request.output_path)
            .args(&request.format_flags)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Reap the child if the run is cancelled or times out
            .kill_on_drop(true);

        debug!("Spawning {:?}", command.as_std());

        let mut child = command.spawn().map_err(|e| {
            let reason = if e.kind() == std::io::ErrorKind::NotFound {
                format!("conversion program '{}' not found in PATH", self.program.display())
            } else {
                format!("failed to start '{}': {}", self.program.display(), e)
            };
            DayNewsError::ConversionFailed {
                exit_code: None,
                reason,
                output: String::new(),
            }
        })?;

        // Drain both pipes as the tool writes so a hang still leaves its output
        let stdout = PipeDrain::spawn(child.stdout.take());
        let stderr = PipeDrain::spawn(child.stderr.take());

        let waited = tokio::time::timeout(request.timeout, child.wait()).await;
        if waited.is_err() {
            warn!("{} exceeded {}s, killing it", self.tool_name(), request.timeout.as_secs());
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", self.tool_name(), e);
            }
        }

        let output = combine_output(&stdout.finish().await, &stderr.finish().await);

        match waited {
            Ok(Ok(status)) => Ok(ToolRun {
                exit_code: status.code(),
                output,
            }),
            Ok(Err(e)) => Err(DayNewsError::Io(e)),
            Err(_) => Err(DayNewsError::ConversionFailed {
                exit_code: None,
                reason: format!("timed out after {}s", request.timeout.as_secs()),
                output,
            }),
        }
    }
}

/// Background reader collecting everything written to one child pipe.
struct PipeDrain {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeDrain {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buffer) = sink.lock() {
                            buffer.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Self { buffer, task }
    }

    /// Wait briefly for EOF; a grandchild may still hold the pipe open.
    async fn finish(mut self) -> Vec<u8> {
        if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut self.task).await.is_err() {
            self.task.abort();
        }
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&String::from_utf8_lossy(stderr));
    }
    combined
}

/// Turns the intermediate document into the e-book artifact.
pub struct ConversionInvoker {
    tool: Arc<dyn ConversionTool>,
    timeout: Duration,
    extra_flags: Vec<String>,
}

impl ConversionInvoker {
    pub fn new(tool: Arc<dyn ConversionTool>, timeout: Duration, extra_flags: Vec<String>) -> Self {
        Self {
            tool,
            timeout,
            extra_flags,
        }
    }

    pub fn request(&self, input_path: &Path, output_path: &Path, title: &str) -> ConversionRequest {
        let mut format_flags = vec![
            format!("--title={}", title),
            "--level1-toc=//h:h1".to_string(),
            "--level2-toc=//h:h2".to_string(),
        ];
        format_flags.extend(self.extra_flags.iter().cloned());

        ConversionRequest {
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            title: title.to_string(),
            format_flags,
            timeout: self.timeout,
        }
    }

    /// Convert `input_path` into `output_path`. Anything short of exit code 0
    /// plus a non-empty artifact is `ConversionFailed`.
    ///
    /// The tool writes next to `input_path`; only a verified artifact is
    /// moved to `output_path`, so a failed run never clobbers an earlier one.
    pub async fn convert(&self, input_path: &Path, output_path: &Path, title: &str) -> Result<ConversionResult> {
        let staging_path = staging_path(input_path, output_path);
        let request = self.request(input_path, &staging_path, title);

        if staging_path.exists() {
            std::fs::remove_file(&staging_path)?;
        }

        info!(
            "Converting {} -> {} with {} (timeout {}s)",
            input_path.display(),
            output_path.display(),
            self.tool.tool_name(),
            self.timeout.as_secs()
        );

        let started = Instant::now();
        let run = match self.tool.run(&request).await {
            Ok(run) => run,
            Err(e) => {
                if let DayNewsError::ConversionFailed { output, .. } = &e {
                    if !output.is_empty() {
                        info!("{} output before failure:\n{}", self.tool.tool_name(), output);
                    }
                }
                error!("Error generating ebook: {}", e);
                return Err(e);
            }
        };

        info!(
            "{} exited with {:?} after {}ms; output follows:\n{}",
            self.tool.tool_name(),
            run.exit_code,
            started.elapsed().as_millis(),
            run.output
        );

        if run.exit_code != Some(0) {
            error!("Conversion failed with exit code {:?}", run.exit_code);
            return Err(DayNewsError::ConversionFailed {
                exit_code: run.exit_code,
                reason: match run.exit_code {
                    Some(code) => format!("tool exited with status {}", code),
                    None => "tool was terminated by a signal".to_string(),
                },
                output: run.output,
            });
        }

        let artifact_size = std::fs::metadata(&staging_path).map(|m| m.len()).unwrap_or(0);
        if artifact_size == 0 {
            error!("Conversion reported success but {} is missing or empty", staging_path.display());
            return Err(DayNewsError::ConversionFailed {
                exit_code: run.exit_code,
                reason: format!("no artifact at {}", staging_path.display()),
                output: run.output,
            });
        }

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = std::fs::rename(&staging_path, output_path) {
            // Different filesystem
            debug!("Rename into {} failed ({}), copying instead", output_path.display(), e);
            std::fs::copy(&staging_path, output_path)?;
            std::fs::remove_file(&staging_path)?;
        }

        let result = ConversionResult {
            artifact_path: output_path.to_path_buf(),
            tool_exit_code: run.exit_code,
            tool_output: run.output,
        };

        info!("Successfully generated ebook at {} ({} bytes)", output_path.display(), artifact_size);
        Ok(result)
    }
}

/// `converting-<artifact name>` beside the intermediate document. The
/// extension is kept since converters pick the format from it.
pub fn staging_path(input_path: &Path, output_path: &Path) -> PathBuf {
    let dir = input_path.parent().unwrap_or_else(|| Path::new("."));
    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    dir.join(format!("converting-{}", name))
}
