//! Subcommand implementations

use std::path::PathBuf;
use tracing::warn;

use crate::assembler::VideoAssembler;
use crate::client::{InferenceRequest, MuseTalkClient};
use crate::error::{CliError, Result};
use crate::inputs::{self, display_path};

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub reference: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub fps: u32,
    pub bbox_shift: i32,
    pub dry_run: bool,
    pub no_fallback: bool,
}

/// How `generate` finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    DryRun,
    LipSynced { frames: usize },
    Static,
}

pub async fn generate(
    client: &MuseTalkClient,
    assembler: VideoAssembler,
    args: &GenerateArgs,
) -> Result<Outcome> {
    inputs::validate_inputs(&args.reference, &args.audio, &args.output)?;
    let ffmpeg_version = assembler.check()?;

    if args.dry_run {
        println!("Dry run: inputs validated successfully");
        println!("  Reference: {}", args.reference.display());
        println!("  Audio: {}", args.audio.display());
        println!("  Output: {}", args.output.display());
        println!("  Server: {}", client.base_url());
        println!("  FPS: {}", args.fps);
        println!("  bbox_shift: {}", args.bbox_shift);
        println!("  FFmpeg: {}", ffmpeg_version);
        return Ok(Outcome::DryRun);
    }

    let audio = inputs::load_audio(&args.audio)?;
    println!(
        "Loaded audio: {:.2}s, {} Hz, {} ch from {}",
        audio.duration_secs,
        audio.sample_rate,
        audio.channels,
        args.audio.display()
    );
    let image = inputs::load_image(&args.reference)?;
    println!(
        "Loaded image: {}x{} from {}",
        image.width,
        image.height,
        args.reference.display()
    );

    let outcome = match client.health().await {
        Ok(health) => {
            println!(
                "Connected to MuseTalk server: {} (version: {}, model loaded: {})",
                health.status,
                health.version.as_deref().unwrap_or("unknown"),
                health.model_loaded
            );
            if !health.model_loaded {
                println!("The model loads on first request, this can take a while");
            }

            println!("Requesting lip-sync inference...");
            let response = client
                .infer(&InferenceRequest {
                    image: image.base64_png,
                    audio: audio.base64_wav,
                    fps: args.fps,
                    bbox_shift: args.bbox_shift,
                })
                .await?;
            if response.fps != args.fps {
                warn!("Server answered at {} fps, requested {}", response.fps, args.fps);
            }
            println!(
                "Received {} frames in {:.1}s, assembling video...",
                response.total_frames, response.processing_time_secs
            );

            let frames = response.into_frames()?;
            let count = frames.len();
            let (audio_path, output) = (args.audio.clone(), args.output.clone());
            blocking(move || assembler.assemble_frames(&frames, &audio_path, &output)).await?;
            Outcome::LipSynced { frames: count }
        }
        Err(err @ CliError::ServerUnavailable { .. }) if !args.no_fallback => {
            warn!("{}", err);
            println!("MuseTalk server not available at {}", client.base_url());
            println!("Falling back to static video mode (no lip-sync)");

            let (image_path, audio_path, output) = (
                args.reference.clone(),
                args.audio.clone(),
                args.output.clone(),
            );
            let duration = audio.duration_secs;
            blocking(move || {
                assembler.assemble_static(&image_path, &audio_path, duration, &output)
            })
            .await?;
            Outcome::Static
        }
        Err(err) => return Err(err),
    };

    let size = std::fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
    println!();
    println!("Output video created successfully!");
    println!("  File: {}", display_path(&args.output).display());
    println!("  Size: {:.2} MB", size as f64 / 1_000_000.0);
    println!("  Duration: {:.2}s", audio.duration_secs);
    println!("  FPS: {}", args.fps);
    if outcome == Outcome::Static {
        println!();
        println!("Note: This is a static video (no lip-sync).");
        println!(
            "Start a MuseTalk server at {} for lip-sync generation.",
            client.base_url()
        );
    }

    Ok(outcome)
}

pub async fn health(client: &MuseTalkClient) -> Result<()> {
    let health = client.health().await?;
    println!("Server: {}", client.base_url());
    println!("  Status: {}", health.status);
    println!(
        "  Version: {}",
        health.version.as_deref().unwrap_or("unknown")
    );
    println!("  Model loaded: {}", health.model_loaded);
    match (health.gpu_available, health.gpu_name.as_deref()) {
        (true, Some(name)) => println!("  GPU: {}", name),
        (true, None) => println!("  GPU: available"),
        (false, _) => println!("  GPU: none"),
    }
    Ok(())
}

async fn blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CliError::Video(format!("assembly task failed: {}", e)))?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::assembler::fake;
    use crate::inputs::fixtures::{write_png, write_wav};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use base64::Engine;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::time::Duration;

    struct Workspace {
        dir: tempfile::TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            write_png(&dir.path().join("face.png"), 8, 8);
            write_wav(&dir.path().join("speech.wav"), 16000, 0.4);
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn args(&self) -> GenerateArgs {
            GenerateArgs {
                reference: self.path("face.png"),
                audio: self.path("speech.wav"),
                output: self.path("out.mp4"),
                fps: 25,
                bbox_shift: 0,
                dry_run: false,
                no_fallback: false,
            }
        }

        fn ffmpeg(&self) -> VideoAssembler {
            fake::ffmpeg(self.dir.path(), 25)
        }

        fn ffmpeg_args(&self) -> String {
            std::fs::read_to_string(self.path("args.log")).unwrap()
        }
    }

    async fn serve(app: Router) -> MuseTalkClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MuseTalkClient::new(&format!("http://{}", addr), Duration::from_secs(10))
    }

    fn unreachable() -> MuseTalkClient {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        MuseTalkClient::new(&url, Duration::from_secs(10))
    }

    fn lip_sync_server(frames: usize) -> Router {
        Router::new()
            .route(
                "/health",
                get(|| async { Json(json!({ "status": "healthy", "model_loaded": true })) }),
            )
            .route(
                "/infer",
                post(move |Json(body): Json<Value>| async move {
                    let image = base64::engine::general_purpose::STANDARD
                        .decode(body["image"].as_str().unwrap())
                        .unwrap();
                    assert_eq!(image::guess_format(&image).unwrap(), image::ImageFormat::Png);
                    let frames: Vec<Value> = (0..frames)
                        .map(|i| {
                            json!({
                                "index": i,
                                "data": base64::engine::general_purpose::STANDARD.encode(&image)
                            })
                        })
                        .collect();
                    Json(json!({
                        "status": "success",
                        "total_frames": frames.len(),
                        "fps": body["fps"],
                        "frames": frames,
                        "processing_time_secs": 0.2
                    }))
                }),
            )
    }

    #[tokio::test]
    async fn frames_from_the_server_become_the_video() {
        let ws = Workspace::new();
        let client = serve(lip_sync_server(4)).await;

        let outcome = generate(&client, ws.ffmpeg(), &ws.args()).await.unwrap();

        assert_eq!(outcome, Outcome::LipSynced { frames: 4 });
        assert_eq!(
            std::fs::read_to_string(ws.path("inputs.log")).unwrap().trim(),
            "4"
        );
        assert!(ws.ffmpeg_args().contains("frame_%05d.png"));
        assert!(ws.path("out.mp4").is_file());
    }

    #[tokio::test]
    async fn unreachable_server_falls_back_to_a_still() {
        let ws = Workspace::new();

        let outcome = generate(&unreachable(), ws.ffmpeg(), &ws.args()).await.unwrap();

        assert_eq!(outcome, Outcome::Static);
        let args = ws.ffmpeg_args();
        assert!(args.contains("-loop 1"));
        assert!(args.contains("face.png"));
        assert!(args.contains("-t 0.40"));
    }

    #[tokio::test]
    async fn no_fallback_surfaces_the_outage() {
        let ws = Workspace::new();
        let args = GenerateArgs {
            no_fallback: true,
            ..ws.args()
        };

        let err = generate(&unreachable(), ws.ffmpeg(), &args).await.unwrap_err();
        assert!(matches!(err, CliError::ServerUnavailable { .. }));
        assert!(!ws.path("out.mp4").exists());
    }

    #[tokio::test]
    async fn server_rejection_is_not_masked_by_the_fallback() {
        let ws = Workspace::new();
        let client = serve(
            Router::new()
                .route("/health", get(|| async { Json(json!({ "status": "healthy" })) }))
                .route(
                    "/infer",
                    post(|| async {
                        (
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({ "detail": "Inference failed: no face detected" })),
                        )
                    }),
                ),
        )
        .await;

        let err = generate(&client, ws.ffmpeg(), &ws.args()).await.unwrap_err();
        assert!(matches!(err, CliError::Server { status: 500, .. }));
        assert!(!ws.path("args.log").exists());
    }

    #[tokio::test]
    async fn dry_run_stops_before_the_network() {
        let ws = Workspace::new();
        let args = GenerateArgs {
            dry_run: true,
            ..ws.args()
        };

        let outcome = generate(&unreachable(), ws.ffmpeg(), &args).await.unwrap();
        assert_eq!(outcome, Outcome::DryRun);
        assert!(!ws.path("args.log").exists());
    }

    #[tokio::test]
    async fn missing_ffmpeg_fails_before_loading_inputs() {
        let ws = Workspace::new();
        let assembler = VideoAssembler::new("/nonexistent/ffmpeg-binary", 25);

        let err = generate(&unreachable(), assembler, &ws.args()).await.unwrap_err();
        assert!(matches!(err, CliError::Video(_)));
    }

    #[tokio::test]
    async fn invalid_reference_is_caught_locally() {
        let ws = Workspace::new();
        let args = GenerateArgs {
            reference: Path::new("missing.png").to_path_buf(),
            ..ws.args()
        };

        let err = generate(&unreachable(), ws.ffmpeg(), &args).await.unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }
}
