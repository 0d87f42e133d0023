//! # Index Rendering
//!
//! The index image is produced by an external renderer that drapes the
//! codec's gradient texture over the terrain and renders it from the camera
//! frame. This module only supervises that step.
//!
//! ## Deadline
//! [`ProcessRenderer`] runs the renderer as a child process and waits on it
//! under `tokio::time::timeout`. When the deadline passes the child is
//! killed and the run fails with `RenderTimeout`; it never blocks forever.
//! Called from inside a multi-thread tokio runtime, the wait runs on that
//! runtime through `block_in_place`. Inside a current-thread runtime the
//! call fails with `RenderFailure`.
//!
//! ## Table of Contents
//! 1. IndexRenderer — Trait
//! 2. ProcessRenderer — Supervised child process
//! 3. PrerenderedIndex — Image rendered out of band

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::config::RegistrationConfig;
use crate::error::{GeoRefError, Result};
use crate::types::CameraFrame;

// ============================================================================
// 1. IndexRenderer — Trait
// ============================================================================

/// Produces the index image for one camera frame
pub trait IndexRenderer {
    fn render(&self, frame: &CameraFrame) -> Result<RgbImage>;
}

// ============================================================================
// 2. ProcessRenderer — Supervised child process
// ============================================================================

/// External renderer invoked as a command line.
///
/// Arguments may contain placeholders filled in from the frame:
/// `{photo}`, `{lat}`, `{lon}`, `{elevation}`, `{bearing}`, `{fov}` and
/// `{output}` (the image path the renderer must write).
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: PathBuf,
    args: Vec<String>,
    output: PathBuf,
    deadline: Duration,
}

impl ProcessRenderer {
    pub fn new(program: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output: output.into(),
            deadline: RegistrationConfig::default().render_timeout(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Deadline taken from `render_timeout_secs`
    pub fn with_config(self, config: &RegistrationConfig) -> Self {
        self.with_deadline(config.render_timeout())
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn expand(&self, arg: &str, frame: &CameraFrame) -> String {
        arg.replace("{photo}", &frame.photo_id)
            .replace("{lat}", &frame.location.latitude.to_string())
            .replace("{lon}", &frame.location.longitude.to_string())
            .replace("{elevation}", &frame.location.elevation.to_string())
            .replace("{bearing}", &frame.viewing_bearing.to_string())
            .replace(
                "{fov}",
                &frame.field_of_view.map(|f| f.to_string()).unwrap_or_default(),
            )
            .replace("{output}", &self.output.to_string_lossy())
    }

    async fn run(&self, frame: &CameraFrame) -> Result<()> {
        let args: Vec<String> = self.args.iter().map(|a| self.expand(a, frame)).collect();
        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GeoRefError::render_failure(format!("failed to start {}: {}", self.program.display(), e))
            })?;

        // Dropping the wait future on expiry kills the child
        let output = tokio::time::timeout(self.deadline, child.wait_with_output())
            .await
            .map_err(|_| GeoRefError::RenderTimeout {
                after: self.deadline,
            })?
            .map_err(|e| GeoRefError::render_failure(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GeoRefError::render_failure(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Drive [`run`](Self::run) to completion from synchronous code.
    ///
    /// Reuses an ambient multi-thread runtime; a current-thread runtime
    /// cannot be blocked on from inside itself.
    fn supervise(&self, frame: &CameraFrame) -> Result<()> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                tokio::runtime::RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| handle.block_on(self.run(frame)))
                }
                _ => Err(GeoRefError::render_failure(
                    "cannot supervise renderer from a current-thread runtime",
                )),
            },
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(self.run(frame))
            }
        }
    }
}

impl IndexRenderer for ProcessRenderer {
    fn render(&self, frame: &CameraFrame) -> Result<RgbImage> {
        // A stale image from an earlier frame must never be picked up
        match std::fs::remove_file(&self.output) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            photo = %frame.photo_id,
            program = %self.program.display(),
            deadline_secs = self.deadline.as_secs_f64(),
            "Rendering index image"
        );
        self.supervise(frame)?;

        let image = image::open(&self.output).map_err(|e| {
            GeoRefError::render_failure(format!(
                "renderer produced no usable image at {}: {}",
                self.output.display(),
                e
            ))
        })?;
        Ok(image.to_rgb8())
    }
}

// ============================================================================
// 3. PrerenderedIndex — Image rendered out of band
// ============================================================================

/// Index image that already exists, on disk or in memory
#[derive(Debug, Clone)]
pub enum PrerenderedIndex {
    File(PathBuf),
    Image(RgbImage),
}

impl PrerenderedIndex {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn image(image: RgbImage) -> Self {
        Self::Image(image)
    }
}

impl IndexRenderer for PrerenderedIndex {
    fn render(&self, _frame: &CameraFrame) -> Result<RgbImage> {
        match self {
            Self::File(path) => Ok(image::open(path)?.to_rgb8()),
            Self::Image(image) => Ok(image.clone()),
        }
    }
}
