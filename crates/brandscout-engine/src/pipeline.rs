//! The auto-design run: scout references, generate a background, stamp the logo.
//!
//! A run only happens when a logo is present. Each phase is announced to the
//! [`ProgressSink`] before its step runs. Scout and generation failures are
//! reported as warnings; a missing background ends the run in `Failed`
//! without compositing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};

use brandscout_contracts::design::{BrandQuery, PipelinePhase};
use brandscout_contracts::events::{new_run_id, EventWriter, RunEvent};

use crate::compositor::{composite_logo, LogoPlacement};
use crate::context::AppContext;
use crate::error::{CompositeError, GenerationError};
use crate::mockup::GenerationOutcome;

/// Receives progress while a run executes.
pub trait ProgressSink {
    fn phase(&mut self, phase: PipelinePhase);
    fn references(&mut self, urls: &[String]);
    fn warning(&mut self, stage: PipelinePhase, message: &str);
}

/// Sink that drops everything.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn phase(&mut self, _phase: PipelinePhase) {}
    fn references(&mut self, _urls: &[String]) {}
    fn warning(&mut self, _stage: PipelinePhase, _message: &str) {}
}

/// The uploaded logo, decoded. Only PNG files are accepted.
#[derive(Debug, Clone)]
pub struct UserLogo {
    image: DynamicImage,
    source: Option<PathBuf>,
}

impl UserLogo {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading logo {}", path.display()))?;
        let format = image::guess_format(&bytes).ok();
        if format != Some(ImageFormat::Png) {
            bail!(
                "logo {} is not a PNG image (detected {})",
                path.display(),
                format
                    .map(|format| format!("{format:?}"))
                    .unwrap_or_else(|| "unknown format".to_string())
            );
        }
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .with_context(|| format!("failed decoding logo {}", path.display()))?;
        Ok(Self {
            image,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image,
            source: None,
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWarning {
    pub stage: PipelinePhase,
    pub message: String,
}

#[derive(Debug)]
pub enum DesignOutcome {
    Composited {
        image: RgbaImage,
        placement: LogoPlacement,
    },
    NoBackground(GenerationError),
    Rejected(CompositeError),
}

#[derive(Debug)]
pub struct DesignRun {
    pub run_id: String,
    pub query: BrandQuery,
    pub references: Vec<String>,
    pub warnings: Vec<RunWarning>,
    pub outcome: DesignOutcome,
}

impl DesignRun {
    pub fn final_phase(&self) -> PipelinePhase {
        match self.outcome {
            DesignOutcome::Composited { .. } => PipelinePhase::Done,
            _ => PipelinePhase::Failed,
        }
    }

    pub fn final_image(&self) -> Option<&RgbaImage> {
        match &self.outcome {
            DesignOutcome::Composited { image, .. } => Some(image),
            _ => None,
        }
    }
}

pub struct Orchestrator<'a> {
    context: &'a AppContext,
    events: Option<EventWriter>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(context: &'a AppContext) -> Self {
        Self {
            context,
            events: None,
        }
    }

    /// Mirrors every run into this log; the writer's run id is replaced per run.
    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns `None` without doing anything when no logo is present.
    pub fn auto_design(
        &self,
        query: &BrandQuery,
        logo: Option<&UserLogo>,
        sink: &mut dyn ProgressSink,
    ) -> Option<DesignRun> {
        let Some(logo) = logo else {
            tracing::debug!("auto design skipped: no logo");
            return None;
        };
        let run_id = new_run_id();
        let mut run = RunState {
            phase: PipelinePhase::Idle,
            events: self.events.as_ref().map(|writer| writer.for_run(run_id.clone())),
            warnings: Vec::new(),
            sink,
        };
        let (logo_width, logo_height) = logo.dimensions();
        run.emit(&RunEvent::RunStarted {
            vibe: query.to_string(),
            logo_width,
            logo_height,
        });

        run.advance(PipelinePhase::Scouting);
        let scouted = self.context.scout(query);
        if let Some(err) = &scouted.warning {
            run.warn(format!("Search failed: {err}"));
        }
        if !scouted.references.is_empty() {
            run.sink.references(&scouted.references);
            run.emit(&RunEvent::ReferencesFound {
                urls: scouted.references.clone(),
            });
        }

        run.advance(PipelinePhase::Generating);
        let background = match self.context.generate(query) {
            GenerationOutcome::Generated(background) => background,
            GenerationOutcome::NoImage(err) => {
                run.warn(format!("Generation failed: {err}"));
                run.advance(PipelinePhase::Failed);
                return Some(run.finish(
                    run_id,
                    query,
                    scouted.references,
                    DesignOutcome::NoBackground(err),
                ));
            }
        };
        let (width, height) = background.dimensions();
        run.emit(&RunEvent::BackgroundGenerated {
            provider: background.provider.clone(),
            model: background.model.clone(),
            width,
            height,
        });

        run.advance(PipelinePhase::Branding);
        let outcome = match composite_logo(&background.image, logo.image()) {
            Ok((image, placement)) => {
                run.emit(&RunEvent::LogoComposited {
                    x: placement.x,
                    y: placement.y,
                    width: placement.width,
                    height: placement.height,
                });
                run.advance(PipelinePhase::Done);
                DesignOutcome::Composited { image, placement }
            }
            Err(err) => {
                run.warn(format!("Branding failed: {err}"));
                run.advance(PipelinePhase::Failed);
                DesignOutcome::Rejected(err)
            }
        };
        Some(run.finish(run_id, query, scouted.references, outcome))
    }
}

struct RunState<'s> {
    phase: PipelinePhase,
    events: Option<EventWriter>,
    warnings: Vec<RunWarning>,
    sink: &'s mut dyn ProgressSink,
}

impl RunState<'_> {
    fn advance(&mut self, next: PipelinePhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::info!(from = ?self.phase, to = ?next, "phase changed");
        self.phase = next;
        self.sink.phase(next);
        self.emit(&RunEvent::PhaseChanged {
            phase: next,
            label: next.label().to_string(),
        });
    }

    fn warn(&mut self, message: String) {
        self.sink.warning(self.phase, &message);
        self.emit(&RunEvent::Warning {
            stage: self.phase,
            message: message.clone(),
        });
        self.warnings.push(RunWarning {
            stage: self.phase,
            message,
        });
    }

    fn emit(&self, event: &RunEvent) {
        let Some(writer) = &self.events else {
            return;
        };
        if let Err(err) = writer.emit(event) {
            tracing::warn!(path = %writer.path().display(), error = %err, "failed writing run event");
        }
    }

    fn finish(
        self,
        run_id: String,
        query: &BrandQuery,
        references: Vec<String>,
        outcome: DesignOutcome,
    ) -> DesignRun {
        self.emit(&RunEvent::RunFinished {
            phase: self.phase,
            warnings: self.warnings.len(),
        });
        DesignRun {
            run_id,
            query: query.clone(),
            references,
            warnings: self.warnings,
            outcome,
        }
    }
}
