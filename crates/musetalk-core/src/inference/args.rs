//! Parameter bundle handed to the MuseTalk entry point
//!
//! Field names match the library's argument namespace, so the same struct
//! serializes to the bridge request and renders as command-line flags.

use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::RuntimeParams;
use crate::model::Pipeline;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceArgs {
    pub ffmpeg_path: PathBuf,
    pub gpu_id: u32,
    pub vae_type: String,
    pub unet_config: PathBuf,
    pub unet_model_path: PathBuf,
    pub whisper_dir: PathBuf,
    pub inference_config: PathBuf,
    pub bbox_shift: i32,
    pub result_dir: PathBuf,
    pub extra_margin: u32,
    pub fps: u32,
    pub audio_padding_length_left: u32,
    pub audio_padding_length_right: u32,
    pub batch_size: u32,
    pub output_vid_name: Option<String>,
    pub use_saved_coord: bool,
    pub saved_coord: bool,
    pub use_float16: bool,
    pub parsing_mode: String,
    pub left_cheek_width: u32,
    pub right_cheek_width: u32,
    pub version: String,
}

impl InferenceArgs {
    /// Combine the resident pipeline, runtime constants and one job's inputs.
    pub fn for_job(
        pipeline: &Pipeline,
        runtime: &RuntimeParams,
        inference_config: &Path,
        result_dir: &Path,
        fps: u32,
        bbox_shift: i32,
    ) -> Self {
        let weights = &pipeline.weights;
        Self {
            ffmpeg_path: weights.ffmpeg_path.clone(),
            gpu_id: runtime.gpu_id,
            vae_type: runtime.vae_type.clone(),
            unet_config: weights.unet_config.clone(),
            unet_model_path: weights.unet_model.clone(),
            whisper_dir: weights.whisper_dir.clone(),
            inference_config: inference_config.to_path_buf(),
            bbox_shift,
            result_dir: result_dir.to_path_buf(),
            extra_margin: runtime.extra_margin,
            fps,
            audio_padding_length_left: runtime.audio_padding_length_left,
            audio_padding_length_right: runtime.audio_padding_length_right,
            batch_size: runtime.batch_size,
            output_vid_name: None,
            use_saved_coord: false,
            saved_coord: false,
            use_float16: runtime.use_float16,
            parsing_mode: runtime.parsing_mode.clone(),
            left_cheek_width: runtime.left_cheek_width,
            right_cheek_width: runtime.right_cheek_width,
            version: pipeline.version.library_tag().to_string(),
        }
    }

    /// Render as flags for `scripts/inference.py`. Boolean switches are only
    /// emitted when set.
    pub fn to_cli_args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(48);
        let mut push = |flag: &str, value: OsString| {
            args.push(OsString::from(flag));
            args.push(value);
        };

        push("--inference_config", self.inference_config.clone().into());
        push("--result_dir", self.result_dir.clone().into());
        push("--fps", self.fps.to_string().into());
        push("--bbox_shift", self.bbox_shift.to_string().into());
        push("--gpu_id", self.gpu_id.to_string().into());
        push("--vae_type", self.vae_type.clone().into());
        push("--unet_config", self.unet_config.clone().into());
        push("--unet_model_path", self.unet_model_path.clone().into());
        push("--whisper_dir", self.whisper_dir.clone().into());
        push("--ffmpeg_path", self.ffmpeg_path.clone().into());
        push("--extra_margin", self.extra_margin.to_string().into());
        push(
            "--audio_padding_length_left",
            self.audio_padding_length_left.to_string().into(),
        );
        push(
            "--audio_padding_length_right",
            self.audio_padding_length_right.to_string().into(),
        );
        push("--batch_size", self.batch_size.to_string().into());
        push("--parsing_mode", self.parsing_mode.clone().into());
        push("--left_cheek_width", self.left_cheek_width.to_string().into());
        push("--right_cheek_width", self.right_cheek_width.to_string().into());
        push("--version", self.version.clone().into());
        if let Some(name) = &self.output_vid_name {
            push("--output_vid_name", name.clone().into());
        }

        for (enabled, flag) in [
            (self.use_float16, "--use_float16"),
            (self.use_saved_coord, "--use_saved_coord"),
            (self.saved_coord, "--saved_coord"),
        ] {
            if enabled {
                args.push(OsString::from(flag));
            }
        }

        args
    }
}
