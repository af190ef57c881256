//! Transition runner.
//!
//! Builds the step list for a request, executes it in order with one shared
//! cancellation token and compensates through the cleanup plan when any step
//! fails or the token fires.

mod request;
#[cfg(test)]
mod tests;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

pub use request::{AfterLoadGate, TransitionRequest, UnloadPolicy};

use crate::{
    collab::TransitionStatus,
    context::{TransitionContext, TransitionServices},
    gate::GateId,
    steps::{
        ActivateStep, BlockInputStep, CleanupReport, CleanupStep, DelayStep, EmitStatusStep,
        FadeInStep, FadeOutStep, HideLoadingStep, LoadDestinationStep, QuarantineFlushStep,
        QuarantinePrepareStep, SetActiveStep, ShowLoadingStep, StepKind, TimedGateStep,
        TransitionStep, UnblockInputStep, UnloadOriginStep, WaitGateStep,
    },
    world::{SceneRef, SceneWorld},
    CancellationToken, Result, SceneSwitchError,
};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// Scene that is active once the run completes.
    pub destination: SceneRef,
    pub executed: Vec<StepKind>,
    pub elapsed: Duration,
    /// Highest load progress reported for the destination.
    pub progress: f32,
}

/// Executes transitions against one set of services, one at a time.
pub struct TransitionRunner {
    services: Arc<TransitionServices>,
    in_flight: AtomicBool,
    last_cleanup: Mutex<Option<CleanupReport>>,
}

impl TransitionRunner {
    pub fn new(services: TransitionServices) -> Self {
        Self::with_shared(Arc::new(services))
    }

    pub fn with_shared(services: Arc<TransitionServices>) -> Self {
        Self {
            services,
            in_flight: AtomicBool::new(false),
            last_cleanup: Mutex::new(None),
        }
    }

    pub fn services(&self) -> &Arc<TransitionServices> {
        &self.services
    }

    pub fn world(&self) -> &SceneWorld {
        &self.services.world
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Report of the most recent forced cleanup, if a run has aborted.
    pub fn last_cleanup(&self) -> Result<Option<CleanupReport>> {
        Ok(self.lock_cleanup()?.clone())
    }

    /// Builds the ordered step list for `request`. Steps the request does not
    /// ask for are left out entirely.
    pub fn build_steps(&self, request: &TransitionRequest) -> Vec<Box<dyn TransitionStep>> {
        let config = &self.services.config;
        let block_input = request.block_input && self.services.input.is_some();
        let fade = request.fade && self.services.fader.is_some();
        let emits = request.events.is_some();

        let mut steps: Vec<Box<dyn TransitionStep>> = Vec::new();
        let emit = |steps: &mut Vec<Box<dyn TransitionStep>>, status| {
            if emits {
                steps.push(Box::new(EmitStatusStep::new(status)));
            }
        };

        if block_input {
            steps.push(Box::new(BlockInputStep));
            emit(&mut steps, TransitionStatus::InputBlocked);
        }
        if fade {
            emit(&mut steps, TransitionStatus::ExitFade);
            let duration = request.fade_out.unwrap_or_else(|| config.transition.fade_out());
            steps.push(Box::new(FadeOutStep::new(duration)));
        }
        if request.gate_before_unload {
            steps.push(Box::new(WaitGateStep::new(GateId::BeforeUnload)));
        }
        if request.show_loading_indicator {
            steps.push(Box::new(ShowLoadingStep));
        }
        if request.unload_policy != UnloadPolicy::Keep {
            emit(&mut steps, TransitionStatus::UnloadOrigin);
            steps.push(Box::new(UnloadOriginStep::new(request.unload_policy)));
        }
        if request.quarantine {
            steps.push(Box::new(QuarantinePrepareStep));
        }

        emit(&mut steps, TransitionStatus::LoadDestination);
        steps.push(Box::new(LoadDestinationStep));
        emit(&mut steps, TransitionStatus::LoadProgressComplete);

        if let Some(gate) = request.gate_after_load {
            match gate.timeout.or_else(|| config.gates.after_load_timeout()) {
                Some(timeout) => {
                    steps.push(Box::new(TimedGateStep::new(GateId::AfterLoad, timeout)))
                }
                None => steps.push(Box::new(WaitGateStep::new(GateId::AfterLoad))),
            }
        }
        if let Some(delay) = request.settle_delay {
            steps.push(Box::new(DelayStep::new(delay)));
        }

        steps.push(Box::new(SetActiveStep));
        if !request.activate_on_load {
            steps.push(Box::new(ActivateStep));
        }
        emit(&mut steps, TransitionStatus::DestinationActivated);

        if request.quarantine {
            let unload_scratch = request
                .unload_scratch_after_flush
                .unwrap_or(config.quarantine.unload_after_flush);
            steps.push(Box::new(QuarantineFlushStep::new(unload_scratch)));
        }
        if request.show_loading_indicator {
            steps.push(Box::new(HideLoadingStep));
        }
        if fade {
            emit(&mut steps, TransitionStatus::EntryFade);
            let duration = request.fade_in.unwrap_or_else(|| config.transition.fade_in());
            steps.push(Box::new(FadeInStep::new(duration)));
        }
        if block_input {
            steps.push(Box::new(UnblockInputStep));
            emit(&mut steps, TransitionStatus::InputUnblocked);
        }
        steps
    }

    pub fn describe(&self, request: &TransitionRequest) -> Vec<StepKind> {
        self.build_steps(request)
            .iter()
            .map(|step| step.kind())
            .collect()
    }

    /// Runs one transition to completion.
    ///
    /// On any step failure, including cancellation, the remaining steps are
    /// skipped, a forced cleanup undoes what the plan still records and the
    /// original error is returned.
    pub async fn run(
        &self,
        request: TransitionRequest,
        token: &CancellationToken,
    ) -> Result<TransitionOutcome> {
        let _flight = FlightGuard::acquire(&self.in_flight)?;
        request.validate()?;
        let key = self.services.resolver.resolve(&request.destination)?;
        let steps = self.build_steps(&request);
        let destination = request.destination.clone();
        let mut ctx = TransitionContext::new(request, key, self.services.clone())?;

        tracing::info!(
            destination = %destination,
            key = %ctx.key(),
            steps = steps.len(),
            "transition started"
        );
        let started = Instant::now();
        let mut executed = Vec::with_capacity(steps.len());

        for step in &steps {
            let kind = step.kind();
            tracing::debug!(step = %kind, "executing step");
            let result = match token.check() {
                Ok(()) => step.execute(&mut ctx, token).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                tracing::warn!(step = %kind, error = %err, "transition aborted, cleaning up");
                if let Err(cleanup) = CleanupStep::forced().execute(&mut ctx, token).await {
                    tracing::warn!(error = %cleanup, "cleanup step failed");
                }
                if let Some(report) = ctx.take_cleanup_report() {
                    self.store_cleanup(report);
                }
                return Err(err);
            }
            executed.push(kind);
        }

        if !ctx.plan().is_clean() {
            CleanupStep::new(false).execute(&mut ctx, token).await?;
            if let Some(report) = ctx.take_cleanup_report() {
                tracing::debug!(performed = report.performed.len(), "settled leftovers after success");
            }
        }

        let scene = match ctx.destination_scene() {
            Some(scene) => scene.clone(),
            None => return Err(SceneSwitchError::msg("transition finished without a destination")),
        };
        let elapsed = started.elapsed();
        tracing::info!(scene = %scene, elapsed = ?elapsed, "transition finished");
        Ok(TransitionOutcome {
            destination: scene,
            executed,
            elapsed,
            progress: ctx.progress(),
        })
    }

    fn store_cleanup(&self, report: CleanupReport) {
        match self.lock_cleanup() {
            Ok(mut slot) => *slot = Some(report),
            Err(err) => tracing::warn!(error = %err, "could not record cleanup report"),
        }
    }

    fn lock_cleanup(&self) -> Result<MutexGuard<'_, Option<CleanupReport>>> {
        self.last_cleanup
            .lock()
            .map_err(|_| SceneSwitchError::msg("cleanup report has been poisoned"))
    }
}

impl std::fmt::Debug for TransitionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionRunner")
            .field("services", &self.services)
            .field("in_flight", &self.is_running())
            .finish()
    }
}

/// Marks the runner busy for as long as it lives.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SceneSwitchError::TransitionInFlight)?;
        Ok(Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
