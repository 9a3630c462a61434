//! Detached background jobs.
//!
//! Jobs never touch conversation state. Each one runs on its own task and
//! reports back by posting a [`JobDone`](EventPayload::JobDone) event onto
//! the shared intake queue, where it is dispatched like any user message.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::config::TranscodeConfig;
use crate::errors::error_logging;
use crate::event::{Event, EventPayload, JobOutcome, TranscodeResult, TranscodeStage};
use crate::gateway::MessagingGateway;

/// Spawns and tracks background work for the dispatcher.
pub struct JobRunner {
    gateway: Arc<dyn MessagingGateway>,
    intake: UnboundedSender<Event>,
    config: TranscodeConfig,
}

impl JobRunner {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        intake: UnboundedSender<Event>,
        config: TranscodeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            intake,
            config,
        })
    }

    /// Convert an uploaded audio file to a voice note off the dispatch path.
    ///
    /// The outcome comes back as a synthetic event for `user`, so the
    /// conversation waiting on it resumes through the ordinary queue.
    pub fn spawn_transcode(
        self: &Arc<Self>,
        user: i64,
        chat: i64,
        language_code: Option<String>,
        file_id: String,
    ) {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            info!(user_id = user, file_id = file_id.as_str(), "Transcode job started");
            let result = match runner.transcode(chat, &file_id).await {
                Ok(voice_file_id) => {
                    info!(user_id = user, "Transcode job finished");
                    TranscodeResult::Converted { voice_file_id }
                }
                Err((stage, message)) => {
                    error_logging::log_job_error(&message, "transcode", &stage.to_string(), user);
                    TranscodeResult::Failed {
                        stage,
                        error: message,
                    }
                }
            };
            let event = Event {
                user,
                chat,
                language_code,
                message_id: None,
                payload: EventPayload::JobDone(JobOutcome::Transcode(result)),
            };
            if runner.intake.send(event).is_err() {
                error!(user_id = user, "Event intake closed, dropping transcode outcome");
            }
        });
    }

    async fn transcode(
        &self,
        chat: i64,
        file_id: &str,
    ) -> Result<String, (TranscodeStage, String)> {
        let dir = tempfile::tempdir()
            .map_err(|e| (TranscodeStage::Download, format!("temp dir: {e}")))?;
        let src = dir.path().join("input");
        let dst = dir.path().join("voice.ogg");

        self.gateway
            .download_file(file_id, &src)
            .await
            .map_err(|e| (TranscodeStage::Download, e.to_string()))?;

        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.arg("-i")
            .arg(&src)
            .args(["-vn", "-c:a", "libopus", "-b:a", "32k", "-ar", "48000", "-ac", "1", "-y"])
            .arg(&dst)
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err((TranscodeStage::Convert, format!("ffmpeg failed to start: {e}")));
            }
            Err(_) => {
                return Err((
                    TranscodeStage::Convert,
                    format!("ffmpeg timed out after {}s", self.config.timeout_secs),
                ));
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("unknown error").to_string();
            return Err((TranscodeStage::Convert, reason));
        }
        debug!(file_id = file_id, "Audio converted to OGG/Opus");

        self.gateway
            .upload_voice(chat, &dst)
            .await
            .map_err(|e| (TranscodeStage::Upload, e.to_string()))
    }
}
