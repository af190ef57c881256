use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::*;
use crate::{
    collab::ParentScope,
    config::IndicatorStrategy,
    context::Compensation,
    key::ResolvedSceneKey,
    loader::{ContentHandle, ContentLoader, FetchError, LoadOptions, ProgressSink},
    test_support::Fixture,
    world::{Transform, UnloadOutcome},
    LoadFailureKind,
};

/// Delegates to the fixture's loader but refuses to integrate staged content.
struct RefusingActivation {
    inner: Arc<dyn ContentLoader>,
}

#[async_trait]
impl ContentLoader for RefusingActivation {
    fn world(&self) -> &SceneWorld {
        self.inner.world()
    }

    async fn load(
        &self,
        key: &ResolvedSceneKey,
        options: LoadOptions,
        progress: &dyn ProgressSink,
        parent: &ParentScope,
        token: &CancellationToken,
    ) -> Result<ContentHandle> {
        self.inner.load(key, options, progress, parent, token).await
    }

    async fn activate(&self, handle: &ContentHandle, _token: &CancellationToken) -> Result<()> {
        Err(SceneSwitchError::load(
            LoadFailureKind::LoadFailed,
            handle.scene().name.clone(),
            "activation refused",
        ))
    }

    async fn unload(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<UnloadOutcome> {
        self.inner.unload(handle, token).await
    }

    fn release_stale(&self) {
        self.inner.release_stale()
    }
}

fn level2_request() -> TransitionRequest {
    TransitionRequest::to("Level2")
        .with_loading_indicator()
        .with_quarantine_named("Scratch")
}

#[test]
fn level2_plan_matches_the_canonical_order() {
    let fixture = Fixture::new();
    let plan = fixture.runner().describe(&level2_request());

    assert_eq!(
        plan,
        vec![
            StepKind::BlockInput,
            StepKind::FadeOut,
            StepKind::ShowLoading,
            StepKind::UnloadOrigin,
            StepKind::QuarantinePrepare,
            StepKind::LoadDestination,
            StepKind::SetActive,
            StepKind::QuarantineFlush,
            StepKind::HideLoading,
            StepKind::FadeIn,
            StepKind::UnblockInput,
        ]
    );
}

#[test]
fn omitted_features_leave_no_steps_behind() {
    let fixture = Fixture::new();
    let request = TransitionRequest::to("Level2")
        .additive()
        .activate_on_load(false)
        .without_fade()
        .without_input_block();

    assert_eq!(
        fixture.runner().describe(&request),
        vec![
            StepKind::LoadDestination,
            StepKind::SetActive,
            StepKind::Activate,
        ]
    );
}

#[test]
fn gates_and_status_steps_are_placed_around_milestones() {
    let fixture = Fixture::new();
    let request = TransitionRequest::to("Level2")
        .with_events(fixture.events.clone())
        .gate_before_unload()
        .gate_after_load(Some(Duration::from_millis(5)))
        .settle_delay(Duration::from_millis(1));

    let plan = fixture.runner().describe(&request);
    let position = |kind: StepKind| plan.iter().position(|step| *step == kind).unwrap();

    assert!(position(StepKind::FadeOut) < position(StepKind::WaitGate(GateId::BeforeUnload)));
    assert!(
        position(StepKind::WaitGate(GateId::BeforeUnload)) < position(StepKind::UnloadOrigin)
    );
    assert!(
        position(StepKind::LoadDestination)
            < position(StepKind::WaitGateTimeout(GateId::AfterLoad))
    );
    assert!(position(StepKind::WaitGateTimeout(GateId::AfterLoad)) < position(StepKind::Delay));
    assert!(position(StepKind::Delay) < position(StepKind::SetActive));
    assert_eq!(
        plan[1],
        StepKind::EmitStatus(TransitionStatus::InputBlocked)
    );
    assert_eq!(
        plan.last(),
        Some(&StepKind::EmitStatus(TransitionStatus::InputUnblocked))
    );
}

#[tokio::test]
async fn level2_example_ends_on_level2() {
    let fixture = Fixture::new();
    let runner = fixture.runner();
    let token = CancellationToken::new();

    let outcome = runner.run(level2_request(), &token).await.unwrap();

    assert_eq!(outcome.destination.name, "Level2");
    assert_eq!(outcome.executed, runner.describe(&level2_request()));
    assert_eq!(outcome.progress, 1.0);
    assert_eq!(fixture.scene_names(), vec!["Level2".to_string()]);
    let active = fixture.world.active_scene().unwrap().unwrap();
    assert_eq!(active.name, "Level2");
    assert!(fixture.world.find_object("LoadingOverlay").unwrap().is_none());
    assert!(!fixture.input.is_blocked());
    assert_eq!(fixture.fader.calls(), vec!["fade-out", "fade-in"]);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn objects_spawned_during_the_window_end_up_in_level2() {
    let fixture = Fixture::new();
    let runner = Arc::new(fixture.runner());
    let request = level2_request()
        .gate_after_load(None)
        .with_events(fixture.events.clone());
    let gates = request.gates.clone();
    let world = fixture.world.clone();
    let token = CancellationToken::new();

    let run = {
        let runner = runner.clone();
        let token = token.clone();
        tokio::spawn(async move { runner.run(request, &token).await })
    };

    // Wait for the destination to land, then spawn while the run is parked
    // on the after-load gate.
    let level = loop {
        if let Some(level) = world.find_scene("Level2").unwrap() {
            break level;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };
    let spill = world
        .spawn("Spill", Transform::at([4.0, 0.0, -2.0]).with_scale([2.0, 2.0, 2.0]))
        .unwrap();
    assert!(!world.is_in_scene(spill, level.id).unwrap());
    gates.open(GateId::AfterLoad);

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.destination, level);
    let info = world.object(spill).unwrap().unwrap();
    assert!(world.is_in_scene(spill, level.id).unwrap());
    assert_eq!(
        info.local,
        Transform::at([4.0, 0.0, -2.0]).with_scale([2.0, 2.0, 2.0])
    );
    assert!(world.find_scene("Scratch").unwrap().is_none());
}

#[tokio::test]
async fn status_events_follow_the_milestones() {
    let fixture = Fixture::new();
    let request = TransitionRequest::to("Level2").with_events(fixture.events.clone());

    fixture
        .runner()
        .run(request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        fixture.events.seen(),
        vec![
            TransitionStatus::InputBlocked,
            TransitionStatus::ExitFade,
            TransitionStatus::UnloadOrigin,
            TransitionStatus::LoadDestination,
            TransitionStatus::LoadProgressComplete,
            TransitionStatus::DestinationActivated,
            TransitionStatus::EntryFade,
            TransitionStatus::InputUnblocked,
        ]
    );
}

#[tokio::test]
async fn timed_gate_soft_times_out() {
    let fixture = Fixture::new();
    let request = TransitionRequest::to("Level2").gate_after_load(Some(Duration::from_millis(10)));

    let outcome = fixture
        .runner()
        .run(request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome
        .executed
        .contains(&StepKind::WaitGateTimeout(GateId::AfterLoad)));
    assert_eq!(outcome.destination.name, "Level2");
}

#[tokio::test]
async fn cancelling_at_a_gate_cleans_up_everything() {
    let fixture = Fixture::new();
    let runner = Arc::new(fixture.runner());
    let request = TransitionRequest::to("Level2")
        .additive()
        .with_loading_indicator()
        .with_quarantine()
        .gate_after_load(None);
    let token = CancellationToken::new();

    let run = {
        let runner = runner.clone();
        let token = token.clone();
        tokio::spawn(async move { runner.run(request, &token).await })
    };
    while fixture.world.find_scene("Level2").unwrap().is_none() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    token.cancel();

    let err = run.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());

    assert!(fixture.world.find_scene("Level2").unwrap().is_none());
    assert!(fixture.world.find_object("LoadingOverlay").unwrap().is_none());
    let menu = fixture.world.find_scene("MainMenu").unwrap().unwrap();
    assert_eq!(fixture.world.active_scene().unwrap(), Some(menu));
    assert_eq!(fixture.world.spawn_redirect().unwrap(), None);
    assert!(!fixture.input.is_blocked());

    let report = runner.last_cleanup().unwrap().unwrap();
    assert!(report.is_clean());
    assert!(report
        .performed
        .iter()
        .any(|action| matches!(action, Compensation::UnloadDestination(_))));
    assert!(report.performed.contains(&Compensation::UnblockInput));
}

#[tokio::test]
async fn cancelling_with_an_indicator_scene_restores_the_menu() {
    let fixture = Fixture::new();
    let runner = Arc::new(fixture.runner());
    let request = TransitionRequest::to("Level2")
        .with_loading_indicator()
        .indicator_strategy(IndicatorStrategy::Scene)
        .gate_after_load(None);
    let token = CancellationToken::new();

    let run = {
        let runner = runner.clone();
        let token = token.clone();
        tokio::spawn(async move { runner.run(request, &token).await })
    };
    while fixture.world.find_scene("Level2").unwrap().is_none() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(fixture.world.find_scene("MainMenu").unwrap().is_some());
    token.cancel();

    let err = run.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());

    assert_eq!(fixture.scene_names(), vec!["MainMenu".to_string()]);
    let menu = fixture.world.find_scene("MainMenu").unwrap().unwrap();
    assert_eq!(fixture.world.active_scene().unwrap(), Some(menu));
    let report = runner.last_cleanup().unwrap().unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report.performed.contains(&Compensation::HideIndicator));
    assert!(!fixture.input.is_blocked());
}

#[tokio::test]
async fn failed_activation_of_an_active_destination_restores_the_menu() {
    let fixture = Fixture::new();
    let services = TransitionServices {
        world: fixture.world.clone(),
        loader: Arc::new(RefusingActivation {
            inner: fixture.services.loader.clone(),
        }),
        resolver: fixture.services.resolver.clone(),
        fader: fixture.services.fader.clone(),
        input: fixture.services.input.clone(),
        config: fixture.services.config.clone(),
    };
    let runner = TransitionRunner::new(services);
    let request = TransitionRequest::to("Level2").activate_on_load(false);
    assert!(runner.describe(&request).contains(&StepKind::Activate));

    let err = runner
        .run(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.load_kind(), Some(LoadFailureKind::LoadFailed));
    assert_eq!(fixture.scene_names(), vec!["MainMenu".to_string()]);
    let menu = fixture.world.find_scene("MainMenu").unwrap().unwrap();
    assert_eq!(fixture.world.active_scene().unwrap(), Some(menu.clone()));
    let report = runner.last_cleanup().unwrap().unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report
        .performed
        .iter()
        .any(|action| matches!(action, Compensation::UnloadDestination(_))));
    assert!(report
        .performed
        .contains(&Compensation::RestoreActive(menu)));
    assert!(!fixture.input.is_blocked());
}

#[tokio::test]
async fn cancelled_before_start_blocks_nothing() {
    let fixture = Fixture::new();
    let token = CancellationToken::new();
    token.cancel();

    let err = fixture
        .runner()
        .run(TransitionRequest::to("Level2"), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fixture.scene_names(), vec!["MainMenu".to_string()]);
    assert!(!fixture.input.is_blocked());
    assert!(fixture.fader.calls().is_empty());
}

#[tokio::test]
async fn remote_fetch_failure_unwinds_and_reports() {
    let fixture = Fixture::new();
    fixture
        .catalog
        .fail("levels/3", FetchError::Unavailable("503".to_string()))
        .unwrap();
    let request = TransitionRequest::to("Level3")
        .with_loading_indicator()
        .indicator_strategy(IndicatorStrategy::Scene)
        .with_events(fixture.events.clone());
    let runner = fixture.runner();

    let err = runner
        .run(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.load_kind(), Some(LoadFailureKind::ContentFetchFailed));
    assert_eq!(fixture.scene_names(), vec!["MainMenu".to_string()]);
    let menu = fixture.world.find_scene("MainMenu").unwrap().unwrap();
    assert_eq!(fixture.world.active_scene().unwrap(), Some(menu));
    let report = runner.last_cleanup().unwrap().unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report.performed.contains(&Compensation::HideIndicator));
    assert!(!fixture.input.is_blocked());
    assert_eq!(
        fixture.events.seen().last(),
        Some(&TransitionStatus::InputUnblocked)
    );
    assert_eq!(fixture.catalog.outstanding("levels/3"), 0);
}

#[tokio::test]
async fn remote_destination_loads_through_the_dispatcher() {
    let fixture = Fixture::new();

    let outcome = fixture
        .runner()
        .run(TransitionRequest::to("Level3"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.destination.name, "Level3");
    assert!(fixture.world.find_object("Boss").unwrap().is_some());
    assert_eq!(fixture.scene_names(), vec!["Level3".to_string()]);
}

#[tokio::test]
async fn unknown_destination_is_rejected_up_front() {
    let fixture = Fixture::new();

    let err = fixture
        .runner()
        .run(TransitionRequest::to("Nowhere"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.load_kind(), Some(LoadFailureKind::ContentNotFound));
    assert!(!fixture.input.is_blocked());
    assert!(fixture.fader.calls().is_empty());
}

#[tokio::test]
async fn overlapping_runs_are_rejected() {
    let fixture = Fixture::new();
    let runner = Arc::new(fixture.runner());
    let request = TransitionRequest::to("Level2").gate_before_unload();
    let gates = request.gates.clone();
    let token = CancellationToken::new();

    let first = {
        let runner = runner.clone();
        let token = token.clone();
        tokio::spawn(async move { runner.run(request, &token).await })
    };
    while !runner.is_running() {
        tokio::task::yield_now().await;
    }

    let err = runner
        .run(TransitionRequest::to("Level2"), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, SceneSwitchError::TransitionInFlight));

    gates.open(GateId::BeforeUnload);
    first.await.unwrap().unwrap();
    assert!(!runner.is_running());
}

#[tokio::test]
async fn staged_destination_is_activated_before_it_counts() {
    let fixture = Fixture::new();
    let request = TransitionRequest::to("Level2")
        .activate_on_load(false)
        .with_quarantine();

    let outcome = fixture
        .runner()
        .run(request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.executed.contains(&StepKind::Activate));
    let level = fixture.world.find_scene("Level2").unwrap().unwrap();
    assert_eq!(
        fixture.world.phase(level.id).unwrap(),
        Some(crate::world::ScenePhase::Integrated)
    );
    assert_eq!(fixture.scene_names(), vec!["Level2".to_string()]);
}
