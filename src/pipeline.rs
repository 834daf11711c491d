//! Orchestrates one end-to-end generation run for a single source image.
//!
//! The six synthesis calls are issued strictly one after another. Scene
//! analysis is the only work allowed to overlap with them; narration reads
//! whatever description exists when it starts and never waits for analysis.
//! Results that arrive after the run was superseded (new source or new run)
//! are dropped by comparing epochs.

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
};
use tracing::{error, info, warn};

use crate::{
    archive,
    error::PipelineError,
    locale,
    models::{
        ArtifactView, FailureKind, GeneratedArtifact, GenerationRequest, Language, Progress, RunPhase,
        RunSnapshot, SourceImage,
    },
    services::{ArchiveBuilder, ImageSynthesisService, NarrationService},
};

#[derive(Debug, Default)]
struct RunState {
    phase: RunPhase,
    language: Language,
    source: Option<SourceImage>,
    artifacts: Vec<GeneratedArtifact>,
    /// `None` while analysis is pending, `Some("")` when it failed.
    scene_description: Option<String>,
    script: Option<String>,
    last_error: Option<String>,
    progress: Option<Progress>,
    exporting: bool,
    source_epoch: u64,
    run_epoch: u64,
    run_task: Option<AbortHandle>,
    analysis_task: Option<AbortHandle>,
}

impl RunState {
    fn clear_outputs(&mut self) {
        self.artifacts.clear();
        self.script = None;
        self.last_error = None;
        self.progress = None;
    }
}

/// A finished zip ready to be handed to the client.
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    pub file_name: String,
    pub content_type: &'static str,
    pub entry_names: Vec<String>,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct GenerationPipeline {
    synthesizer: Arc<dyn ImageSynthesisService>,
    narrator: Arc<dyn NarrationService>,
    archiver: Arc<dyn ArchiveBuilder>,
    state: Arc<RwLock<RunState>>,
    progress_tx: Arc<watch::Sender<Option<Progress>>>,
}

// Clears the "already exporting" flag however the export ends.
struct ExportGuard<'a>(&'a RwLock<RunState>);

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.0.write().exporting = false;
    }
}

impl GenerationPipeline {
    pub fn new(
        synthesizer: Arc<dyn ImageSynthesisService>,
        narrator: Arc<dyn NarrationService>,
        archiver: Arc<dyn ArchiveBuilder>,
    ) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            synthesizer,
            narrator,
            archiver,
            state: Arc::default(),
            progress_tx: Arc::new(tx),
        }
    }

    /// Replaces the source image and resets the run to `Idle`.
    ///
    /// Any in-flight generation or analysis is aborted. A best-effort scene
    /// analysis is started in the background; its failure only leaves the
    /// description empty. Must be called from within a tokio runtime.
    pub fn submit_source(&self, image: SourceImage) {
        let epoch = {
            let mut st = self.state.write();
            if let Some(task) = st.run_task.take() {
                task.abort();
            }
            if let Some(task) = st.analysis_task.take() {
                task.abort();
            }
            st.source_epoch += 1;
            st.run_epoch += 1;
            st.phase = RunPhase::Idle;
            st.clear_outputs();
            st.scene_description = None;
            st.source = Some(image.clone());
            st.source_epoch
        };
        self.progress_tx.send_replace(None);
        info!("📷 Source image submitted ({}, {} bytes)", image.mime_type, image.bytes.len());

        let narrator = self.narrator.clone();
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            let description = match narrator.analyze_scene(&image).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!("⚠️ Scene analysis failed, continuing without description: {}", e);
                    String::new()
                }
            };
            let mut st = state.write();
            if st.source_epoch == epoch {
                st.scene_description = Some(description);
                st.analysis_task = None;
            }
        });

        let mut st = self.state.write();
        if st.source_epoch == epoch && !task.is_finished() {
            st.analysis_task = Some(task.abort_handle());
        }
    }

    /// Stops any spawned run or analysis and drops results still in flight.
    /// Outputs already recorded stay readable until the pipeline is dropped.
    pub fn cancel(&self) {
        let mut st = self.state.write();
        let aborted = st.run_task.is_some();
        if let Some(task) = st.run_task.take() {
            task.abort();
        }
        if let Some(task) = st.analysis_task.take() {
            task.abort();
        }
        st.source_epoch += 1;
        st.run_epoch += 1;
        if st.phase.is_running() {
            st.phase = RunPhase::Idle;
        }
        drop(st);
        if aborted {
            info!("🛑 Generation run cancelled");
        }
    }

    /// Runs the whole sequence on the current task.
    pub async fn start_generation(&self, language: Language) -> Result<(), PipelineError> {
        let (epoch, source) = self.begin_run(language)?;
        self.drive(epoch, language, source).await
    }

    /// Checks preconditions now, then runs the sequence on a spawned task
    /// that the next `submit_source` can abort.
    pub fn spawn_generation(&self, language: Language) -> Result<JoinHandle<Result<(), PipelineError>>, PipelineError> {
        let (epoch, source) = self.begin_run(language)?;
        let this = self.clone();
        let handle = tokio::spawn(async move { this.drive(epoch, language, source).await });
        let mut st = self.state.write();
        if st.run_epoch == epoch {
            st.run_task = Some(handle.abort_handle());
        }
        Ok(handle)
    }

    fn begin_run(&self, language: Language) -> Result<(u64, SourceImage), PipelineError> {
        let mut st = self.state.write();
        if st.phase.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        let source = st.source.clone().ok_or(PipelineError::NoSource)?;
        st.run_epoch += 1;
        st.phase = RunPhase::GeneratingImages;
        st.language = language;
        st.clear_outputs();
        let epoch = st.run_epoch;
        drop(st);
        self.progress_tx.send_replace(None);
        info!("🚀 Starting generation run #{} ({})", epoch, language);
        Ok((epoch, source))
    }

    async fn drive(&self, epoch: u64, language: Language, source: SourceImage) -> Result<(), PipelineError> {
        let requests = locale::generation_requests(language);
        let total = requests.len();

        for (i, request) in requests.into_iter().enumerate() {
            let step = i + 1;
            info!("🎯 Generating {}/{}: {}", step, total, request.label);
            let result = self.synthesizer.synthesize(&request.prompt, &source).await;
            match result {
                Ok(image) => self.record_artifact(epoch, step, total, request, image)?,
                Err(e) => {
                    error!("❌ Horizon {}/{} ({}) failed: {}", step, total, request.label, e);
                    self.finish(epoch, RunPhase::Failed(FailureKind::Images), Some(locale::generation_failed(language)))?;
                    return Err(PipelineError::Synthesis { step, label: request.label, source: e });
                }
            }
        }

        let scene = {
            let mut st = self.state.write();
            if st.run_epoch != epoch {
                return Err(PipelineError::Superseded);
            }
            st.phase = RunPhase::GeneratingScript;
            st.scene_description.clone().unwrap_or_default()
        };
        if scene.is_empty() {
            info!("✍️ Writing narration without scene description");
        } else {
            info!("✍️ Writing narration for scene: {}", scene);
        }

        match self.narrator.write_script(language, &scene).await {
            Ok(script) => {
                {
                    let mut st = self.state.write();
                    if st.run_epoch != epoch {
                        return Err(PipelineError::Superseded);
                    }
                    st.script = Some(script);
                }
                self.finish(epoch, RunPhase::Ready, None)?;
                info!("✅ Run #{} ready with {} images and a script", epoch, total);
                Ok(())
            }
            Err(e) => {
                error!("❌ Narration failed after all images succeeded: {}", e);
                self.finish(epoch, RunPhase::Failed(FailureKind::ScriptOnly), Some(locale::script_failed(language)))?;
                Err(PipelineError::Script(e))
            }
        }
    }

    fn record_artifact(
        &self,
        epoch: u64,
        step: usize,
        total: usize,
        request: GenerationRequest,
        image: Bytes,
    ) -> Result<(), PipelineError> {
        let progress = {
            let mut st = self.state.write();
            if st.run_epoch != epoch {
                info!("Discarding late result for superseded run #{}", epoch);
                return Err(PipelineError::Superseded);
            }
            let progress = Progress { completed: step, total, label: request.label.clone() };
            st.artifacts.push(GeneratedArtifact {
                index: step,
                horizon: request.horizon,
                label: request.label,
                image,
                created_at: Utc::now(),
            });
            st.progress = Some(progress.clone());
            progress
        };
        info!("✅ Generated {}/{}: {}", progress.completed, progress.total, progress.label);
        self.progress_tx.send_replace(Some(progress));
        Ok(())
    }

    fn finish(&self, epoch: u64, phase: RunPhase, message: Option<&str>) -> Result<(), PipelineError> {
        let mut st = self.state.write();
        if st.run_epoch != epoch {
            return Err(PipelineError::Superseded);
        }
        st.phase = phase;
        st.last_error = message.map(str::to_string);
        st.run_task = None;
        Ok(())
    }

    /// Bundles the source, script and all artifacts. Only valid in `Ready`;
    /// a failed build leaves the run untouched so it can be retried.
    pub async fn export_archive(&self) -> Result<ArchiveHandle, PipelineError> {
        let entries = {
            let mut st = self.state.write();
            if st.phase != RunPhase::Ready {
                return Err(PipelineError::NothingToExport);
            }
            if st.exporting {
                return Err(PipelineError::ExportInProgress);
            }
            let (Some(source), Some(script)) = (st.source.as_ref(), st.script.as_ref()) else {
                return Err(PipelineError::NothingToExport);
            };
            let entries = archive::run_entries(source, script, &st.artifacts);
            st.exporting = true;
            entries
        };
        let _guard = ExportGuard(&self.state);

        let entry_names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let bytes = self.archiver.build(entries).await.map_err(|e| {
            warn!("⚠️ Archive assembly failed: {}", e);
            PipelineError::Archive(e)
        })?;

        Ok(ArchiveHandle {
            file_name: format!("life-after-people-{}.zip", Utc::now().format("%Y%m%d-%H%M%S")),
            content_type: "application/zip",
            entry_names,
            bytes,
        })
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let st = self.state.read();
        RunSnapshot {
            phase: st.phase,
            language: st.language,
            source_mime_type: st.source.as_ref().map(|s| s.mime_type.clone()),
            progress: st.progress.clone(),
            artifacts: st.artifacts.iter().map(ArtifactView::from).collect(),
            scene_description: st.scene_description.clone(),
            script: st.script.clone(),
            error: st.last_error.clone(),
            exporting: st.exporting,
        }
    }

    pub fn artifact(&self, index: usize) -> Option<GeneratedArtifact> {
        self.state.read().artifacts.iter().find(|a| a.index == index).cloned()
    }

    pub fn phase(&self) -> RunPhase {
        self.state.read().phase
    }

    pub fn language(&self) -> Language {
        self.state.read().language
    }

    /// Progress notifications; `None` between runs.
    pub fn subscribe(&self) -> watch::Receiver<Option<Progress>> {
        self.progress_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::SCRIPT_ENTRY_NAME,
        models::HORIZON_COUNT,
        services::{AnalysisError, ArchiveEntry, ArchiveError, ScriptError, SynthesisError},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeSynth {
        fail_at: Option<usize>,
        hold_at: Option<usize>,
        reached: Notify,
        release: Notify,
        prompts: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ImageSynthesisService for FakeSynth {
        async fn synthesize(&self, prompt: &str, _image: &SourceImage) -> Result<Bytes, SynthesisError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let call = {
                let mut prompts = self.prompts.lock();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            if self.hold_at == Some(call) {
                self.reached.notify_one();
                self.release.notified().await;
            } else {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_at == Some(call) {
                return Err(SynthesisError(format!("model refused call {call}")));
            }
            Ok(Bytes::from(format!("png-{call}")))
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Analysis {
        Describe,
        Fail,
        Never,
    }

    struct FakeNarrator {
        analysis: Analysis,
        script_fails: bool,
        hold_script: bool,
        script_reached: Notify,
        script_release: Notify,
        script_calls: Mutex<Vec<(Language, String)>>,
    }

    impl FakeNarrator {
        fn new(analysis: Analysis) -> Self {
            Self {
                analysis,
                script_fails: false,
                hold_script: false,
                script_reached: Notify::new(),
                script_release: Notify::new(),
                script_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NarrationService for FakeNarrator {
        async fn analyze_scene(&self, _image: &SourceImage) -> Result<String, AnalysisError> {
            match self.analysis {
                Analysis::Describe => Ok(" a harbour at dusk ".to_string()),
                Analysis::Fail => Err(AnalysisError("vision offline".into())),
                Analysis::Never => std::future::pending().await,
            }
        }

        async fn write_script(&self, language: Language, scene: &str) -> Result<String, ScriptError> {
            self.script_calls.lock().push((language, scene.to_string()));
            if self.hold_script {
                self.script_reached.notify_one();
                self.script_release.notified().await;
            }
            if self.script_fails {
                return Err(ScriptError("quota exceeded".into()));
            }
            Ok(format!("script for '{scene}'"))
        }
    }

    #[derive(Default)]
    struct FlakyArchiver {
        failures_left: AtomicUsize,
        attempts: AtomicUsize,
        hold_at: Option<usize>,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ArchiveBuilder for FlakyArchiver {
        async fn build(&self, entries: Vec<ArchiveEntry>) -> Result<Bytes, ArchiveError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hold_at == Some(attempt) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ArchiveError("out of memory".into()));
            }
            Ok(Bytes::from(entries.len().to_string()))
        }
    }

    fn jpeg(len: usize) -> SourceImage {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len, 0x42);
        SourceImage::new("image/jpeg", bytes)
    }

    fn pipeline(synth: Arc<FakeSynth>, narrator: Arc<FakeNarrator>, archiver: Arc<FlakyArchiver>) -> GenerationPipeline {
        GenerationPipeline::new(synth, narrator, archiver)
    }

    #[tokio::test]
    async fn full_run_is_ready_and_exports_eight_entries() {
        let synth = Arc::new(FakeSynth::default());
        let narrator = Arc::new(FakeNarrator::new(Analysis::Describe));
        let archiver = Arc::new(FlakyArchiver::default());
        let p = pipeline(synth.clone(), narrator.clone(), archiver.clone());

        p.submit_source(jpeg(500));
        tokio::time::sleep(Duration::from_millis(10)).await;
        p.start_generation(Language::En).await.unwrap();

        let expected: Vec<String> = locale::generation_requests(Language::En).into_iter().map(|r| r.prompt).collect();
        assert_eq!(*synth.prompts.lock(), expected);
        assert_eq!(synth.max_in_flight.load(Ordering::SeqCst), 1);

        let snap = p.snapshot();
        assert_eq!(snap.phase, RunPhase::Ready);
        assert_eq!(snap.artifacts.len(), HORIZON_COUNT);
        assert_eq!(snap.artifacts[5].label, "+1,000,000 Years");
        assert_eq!(snap.script.as_deref(), Some("script for 'a harbour at dusk'"));
        assert_eq!(*narrator.script_calls.lock(), vec![(Language::En, "a harbour at dusk".to_string())]);

        let handle = p.export_archive().await.unwrap();
        assert_eq!(handle.entry_names.len(), 8);
        assert_eq!(handle.entry_names[0], "original.jpg");
        assert_eq!(handle.entry_names[1], SCRIPT_ENTRY_NAME);
        assert_eq!(handle.entry_names[7], "06__1_000_000_years.png");
        assert_eq!(handle.content_type, "application/zip");
        assert_eq!(p.phase(), RunPhase::Ready);
        assert!(!p.snapshot().exporting);
    }

    #[tokio::test]
    async fn failure_at_step_k_keeps_prior_artifacts_and_skips_script() {
        for k in 1..=HORIZON_COUNT {
            let synth = Arc::new(FakeSynth { fail_at: Some(k), ..Default::default() });
            let narrator = Arc::new(FakeNarrator::new(Analysis::Describe));
            let p = pipeline(synth.clone(), narrator.clone(), Arc::default());

            p.submit_source(jpeg(64));
            let err = p.start_generation(Language::En).await.unwrap_err();
            assert!(matches!(err, PipelineError::Synthesis { step, .. } if step == k));

            let snap = p.snapshot();
            assert_eq!(snap.phase, RunPhase::Failed(FailureKind::Images));
            assert_eq!(snap.artifacts.len(), k - 1);
            assert_eq!(synth.prompts.lock().len(), k);
            assert!(narrator.script_calls.lock().is_empty());
            assert_eq!(snap.error.as_deref(), Some(locale::generation_failed(Language::En)));
        }
    }

    #[tokio::test]
    async fn third_call_failure_leaves_first_two_labels() {
        let synth = Arc::new(FakeSynth { fail_at: Some(3), ..Default::default() });
        let p = pipeline(synth, Arc::new(FakeNarrator::new(Analysis::Fail)), Arc::default());
        p.submit_source(jpeg(64));
        let _ = p.start_generation(Language::Ja).await;

        let labels: Vec<String> = p.snapshot().artifacts.into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["1年後".to_string(), "100年後".to_string()]);
    }

    #[tokio::test]
    async fn script_failure_keeps_images_and_blocks_export() {
        let narrator = Arc::new(FakeNarrator { script_fails: true, ..FakeNarrator::new(Analysis::Describe) });
        let p = pipeline(Arc::default(), narrator, Arc::default());
        p.submit_source(jpeg(64));

        let err = p.start_generation(Language::Zh).await.unwrap_err();
        assert!(matches!(err, PipelineError::Script(_)));

        let snap = p.snapshot();
        assert_eq!(snap.phase, RunPhase::Failed(FailureKind::ScriptOnly));
        assert_eq!(snap.artifacts.len(), HORIZON_COUNT);
        assert_eq!(snap.error.as_deref(), Some(locale::script_failed(Language::Zh)));
        assert!(matches!(p.export_archive().await, Err(PipelineError::NothingToExport)));
    }

    #[tokio::test]
    async fn narration_does_not_wait_for_slow_analysis() {
        let narrator = Arc::new(FakeNarrator::new(Analysis::Never));
        let p = pipeline(Arc::default(), narrator.clone(), Arc::default());
        p.submit_source(jpeg(64));

        p.start_generation(Language::En).await.unwrap();
        assert_eq!(p.phase(), RunPhase::Ready);
        assert_eq!(*narrator.script_calls.lock(), vec![(Language::En, String::new())]);
        assert_eq!(p.snapshot().scene_description, None);
    }

    #[tokio::test]
    async fn analysis_failure_is_silent() {
        let p = pipeline(Arc::default(), Arc::new(FakeNarrator::new(Analysis::Fail)), Arc::default());
        p.submit_source(jpeg(64));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snap = p.snapshot();
        assert_eq!(snap.scene_description.as_deref(), Some(""));
        assert_eq!(snap.error, None);
        p.start_generation(Language::En).await.unwrap();
        assert_eq!(p.phase(), RunPhase::Ready);
    }

    #[tokio::test]
    async fn submit_during_generation_resets_to_idle() {
        let synth = Arc::new(FakeSynth { hold_at: Some(2), ..Default::default() });
        let narrator = Arc::new(FakeNarrator::new(Analysis::Describe));
        let p = pipeline(synth.clone(), narrator.clone(), Arc::default());
        p.submit_source(jpeg(64));

        let runner = p.clone();
        let run = tokio::spawn(async move { runner.start_generation(Language::En).await });
        synth.reached.notified().await;
        assert_eq!(p.phase(), RunPhase::GeneratingImages);
        assert!(matches!(p.start_generation(Language::En).await, Err(PipelineError::AlreadyRunning)));

        p.submit_source(jpeg(128));
        let snap = p.snapshot();
        assert_eq!(snap.phase, RunPhase::Idle);
        assert!(snap.artifacts.is_empty());

        synth.release.notify_one();
        assert!(matches!(run.await.unwrap(), Err(PipelineError::Superseded)));
        let snap = p.snapshot();
        assert_eq!(snap.phase, RunPhase::Idle);
        assert!(snap.artifacts.is_empty());
        assert!(narrator.script_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn submit_aborts_spawned_run() {
        let synth = Arc::new(FakeSynth { hold_at: Some(1), ..Default::default() });
        let p = pipeline(synth.clone(), Arc::new(FakeNarrator::new(Analysis::Describe)), Arc::default());
        p.submit_source(jpeg(64));

        let handle = p.spawn_generation(Language::En).unwrap();
        synth.reached.notified().await;
        p.submit_source(jpeg(64));

        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(p.phase(), RunPhase::Idle);
        assert_eq!(synth.prompts.lock().len(), 1);
    }

    #[tokio::test]
    async fn generation_requires_a_source() {
        let p = pipeline(Arc::default(), Arc::new(FakeNarrator::new(Analysis::Describe)), Arc::default());
        assert!(matches!(p.start_generation(Language::En).await, Err(PipelineError::NoSource)));
        assert!(matches!(p.export_archive().await, Err(PipelineError::NothingToExport)));
        assert_eq!(p.phase(), RunPhase::Idle);
    }

    #[tokio::test]
    async fn failed_export_can_be_retried() {
        let archiver = Arc::new(FlakyArchiver { failures_left: AtomicUsize::new(1), ..Default::default() });
        let p = pipeline(Arc::default(), Arc::new(FakeNarrator::new(Analysis::Describe)), archiver.clone());
        p.submit_source(jpeg(64));
        p.start_generation(Language::En).await.unwrap();

        assert!(matches!(p.export_archive().await, Err(PipelineError::Archive(_))));
        let snap = p.snapshot();
        assert_eq!(snap.phase, RunPhase::Ready);
        assert_eq!(snap.artifacts.len(), HORIZON_COUNT);
        assert!(!snap.exporting);

        let handle = p.export_archive().await.unwrap();
        assert_eq!(&handle.bytes[..], b"8");
        assert_eq!(archiver.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_export_is_rejected_until_first_finishes() {
        let archiver = Arc::new(FlakyArchiver { hold_at: Some(1), ..Default::default() });
        let p = pipeline(Arc::default(), Arc::new(FakeNarrator::new(Analysis::Describe)), archiver.clone());
        p.submit_source(jpeg(64));
        p.start_generation(Language::En).await.unwrap();

        let exporter = p.clone();
        let first = tokio::spawn(async move { exporter.export_archive().await });
        archiver.reached.notified().await;
        assert!(p.snapshot().exporting);
        assert!(matches!(p.export_archive().await, Err(PipelineError::ExportInProgress)));

        archiver.release.notify_one();
        let handle = first.await.unwrap().unwrap();
        assert_eq!(handle.entry_names.len(), 8);
        assert!(!p.snapshot().exporting);
        assert_eq!(p.phase(), RunPhase::Ready);

        p.export_archive().await.unwrap();
        assert_eq!(archiver.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn submit_while_writing_script_discards_run() {
        let narrator = Arc::new(FakeNarrator { hold_script: true, ..FakeNarrator::new(Analysis::Describe) });
        let p = pipeline(Arc::default(), narrator.clone(), Arc::default());
        p.submit_source(jpeg(64));

        let runner = p.clone();
        let run = tokio::spawn(async move { runner.start_generation(Language::En).await });
        narrator.script_reached.notified().await;
        assert_eq!(p.phase(), RunPhase::GeneratingScript);
        assert_eq!(p.snapshot().artifacts.len(), HORIZON_COUNT);

        p.submit_source(jpeg(128));
        narrator.script_release.notify_one();
        assert!(matches!(run.await.unwrap(), Err(PipelineError::Superseded)));

        let snap = p.snapshot();
        assert_eq!(snap.phase, RunPhase::Idle);
        assert!(snap.artifacts.is_empty());
        assert_eq!(snap.script, None);
        assert_eq!(snap.progress, None);
        assert!(matches!(p.export_archive().await, Err(PipelineError::NothingToExport)));
    }

    #[tokio::test]
    async fn cancel_stops_spawned_run() {
        let synth = Arc::new(FakeSynth { hold_at: Some(2), ..Default::default() });
        let narrator = Arc::new(FakeNarrator::new(Analysis::Never));
        let p = pipeline(synth.clone(), narrator.clone(), Arc::default());
        p.submit_source(jpeg(64));

        let handle = p.spawn_generation(Language::En).unwrap();
        synth.reached.notified().await;
        p.cancel();

        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(p.phase(), RunPhase::Idle);
        assert_eq!(synth.prompts.lock().len(), 2);
        assert!(narrator.script_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn progress_is_published_per_artifact() {
        let p = pipeline(Arc::default(), Arc::new(FakeNarrator::new(Analysis::Describe)), Arc::default());
        let rx = p.subscribe();
        p.submit_source(jpeg(64));
        p.start_generation(Language::En).await.unwrap();

        let last = rx.borrow().clone();
        assert_eq!(
            last,
            Some(Progress { completed: 6, total: 6, label: "+1,000,000 Years".to_string() })
        );
    }
}
