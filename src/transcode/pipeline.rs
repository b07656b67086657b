//! Processing pipeline orchestration
//!
//! Turns a raw recording into the distributable video plus a thumbnail:
//! stage the clip, convert it, confirm the video exists, extract one frame
//! from the converted video, read both results and clean the workspace.

use super::traits::Transcoder;
use super::types::{
    PipelineSettings, PipelineUpdate, ProcessedClip, TranscodeDirective, TranscodeStep,
    INPUT_NAME, THUMBNAIL_NAME, VIDEO_NAME,
};
use crate::recorder::state::RawClip;
use crate::utils::error::TranscodeError;

/// Run the fixed processing sequence for one clip.
///
/// Both outputs are returned together or not at all. The workspace is cleaned
/// on every path; cleanup problems are only logged.
pub async fn process_clip<F>(
    transcoder: &dyn Transcoder,
    clip: &RawClip,
    settings: &PipelineSettings,
    on_update: F,
) -> Result<ProcessedClip, TranscodeError>
where
    F: Fn(PipelineUpdate) + Send + Sync,
{
    tracing::info!(
        "Processing clip: {} bytes from {} chunks",
        clip.len(),
        clip.stats.chunk_count
    );

    let result = run_steps(transcoder, clip, settings, &on_update).await;

    for warning in transcoder
        .cleanup(&[INPUT_NAME, VIDEO_NAME, THUMBNAIL_NAME])
        .await
    {
        tracing::warn!("Workspace cleanup: {}", warning);
    }

    match &result {
        Ok(processed) => tracing::info!(
            "Processing complete: video {} bytes, thumbnail {} bytes",
            processed.video.len(),
            processed.thumbnail.len()
        ),
        Err(e) => tracing::error!("Processing failed: {}", e),
    }
    result
}

async fn run_steps<F>(
    transcoder: &dyn Transcoder,
    clip: &RawClip,
    settings: &PipelineSettings,
    on_update: &F,
) -> Result<ProcessedClip, TranscodeError>
where
    F: Fn(PipelineUpdate) + Send + Sync,
{
    if clip.is_empty() {
        return Err(TranscodeError::InvalidInput("recording is empty".to_string()));
    }

    let report = |fraction: f32| on_update(PipelineUpdate::Progress(fraction));

    on_update(PipelineUpdate::Step(TranscodeStep::WritingInput));
    transcoder.put(INPUT_NAME, clip.data.clone()).await?;

    on_update(PipelineUpdate::Step(TranscodeStep::Converting));
    transcoder
        .run(&TranscodeDirective::convert(&settings.video_codec), &report)
        .await?;

    // The thumbnail is cut from the converted video, so it must exist first.
    let video = transcoder.get(VIDEO_NAME).await?;

    on_update(PipelineUpdate::Step(TranscodeStep::ExtractingThumbnail));
    transcoder
        .run(&TranscodeDirective::thumbnail(settings.thumbnail_offset), &report)
        .await?;

    on_update(PipelineUpdate::Step(TranscodeStep::ReadingResults));
    let thumbnail = transcoder.get(THUMBNAIL_NAME).await?;

    Ok(ProcessedClip { video, thumbnail })
}
