//! Video assembly with ffmpeg
//!
//! Lip-synced frames are written as a numbered PNG sequence and muxed with
//! the original audio. Without a server, the reference image is looped for
//! the length of the audio instead.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use crate::error::{CliError, Result};

const FRAME_PATTERN: &str = "frame_%05d.png";

pub struct VideoAssembler {
    program: OsString,
    prefix: Vec<OsString>,
    fps: u32,
}

impl VideoAssembler {
    pub fn new(ffmpeg: impl Into<OsString>, fps: u32) -> Self {
        Self {
            program: ffmpeg.into(),
            prefix: Vec::new(),
            fps,
        }
    }

    /// First line of `ffmpeg -version`.
    pub fn check(&self) -> Result<String> {
        let output = self
            .command()
            .arg("-version")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(CliError::Video(format!(
                "{} -version exited with {}",
                self.program.to_string_lossy(),
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Mux decoded PNG frames with `audio` into `output`.
    pub fn assemble_frames(&self, frames: &[Vec<u8>], audio: &Path, output: &Path) -> Result<()> {
        if frames.is_empty() {
            return Err(CliError::Video("server returned no frames".to_string()));
        }
        info!("Assembling {} frames into video", frames.len());

        let dir = tempfile::Builder::new().prefix("musetalk-frames-").tempdir()?;
        for (i, frame) in frames.iter().enumerate() {
            std::fs::write(dir.path().join(format!("frame_{:05}.png", i)), frame)?;
        }

        self.run(self.frames_args(&dir.path().join(FRAME_PATTERN), audio, output))?;
        info!("Video created: {}", output.display());
        Ok(())
    }

    /// Loop `image` for `duration_secs` under `audio`. No lip-sync.
    pub fn assemble_static(
        &self,
        image: &Path,
        audio: &Path,
        duration_secs: f32,
        output: &Path,
    ) -> Result<()> {
        info!(
            "Creating static video: {:.2}s at {} fps",
            duration_secs, self.fps
        );
        self.run(self.static_args(image, audio, duration_secs, output))?;
        info!("Static video created: {}", output.display());
        Ok(())
    }

    fn frames_args(&self, pattern: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-framerate".into(),
            self.fps.to_string().into(),
            "-i".into(),
            pattern.into(),
            "-i".into(),
            audio.into(),
        ];
        args.extend(encoder_args());
        args.push("-shortest".into());
        args.push(output.into());
        args
    }

    fn static_args(
        &self,
        image: &Path,
        audio: &Path,
        duration_secs: f32,
        output: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-loop".into(),
            "1".into(),
            "-framerate".into(),
            self.fps.to_string().into(),
            "-i".into(),
            image.into(),
            "-i".into(),
            audio.into(),
        ];
        args.extend(encoder_args());
        args.push("-t".into());
        args.push(format!("{:.2}", duration_secs).into());
        args.push("-shortest".into());
        args.push(output.into());
        args
    }

    fn run(&self, args: Vec<OsString>) -> Result<()> {
        debug!("Running {} {:?}", self.program.to_string_lossy(), args);
        let output = self
            .command()
            .args(&args)
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(CliError::Video(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix);
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> CliError {
        CliError::Video(format!(
            "failed to run {}: {}. Is ffmpeg installed?",
            self.program.to_string_lossy(),
            err
        ))
    }
}

/// H.264 video, AAC audio, 4:2:0 for player compatibility.
fn encoder_args() -> Vec<OsString> {
    [
        "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "aac", "-b:a", "128k",
        "-pix_fmt", "yuv420p",
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}
