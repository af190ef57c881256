use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use scene_switch_core::{
    loader::FetchError,
    world::{ObjectBlueprint, ScenePhase, Transform},
    AppConfig, Backend, CancellationToken, CountingInputBlocker, DispatchingLoader,
    InMemoryRemoteCatalog, IndicatorStrategy, NativeContentLoader, RemoteContentLoader,
    SceneBlueprint, SceneEntry, SceneKeyResolver, SceneSwitchError, SceneWorld, TimedFader,
    TracingEvents, TransitionRequest, TransitionRunner, TransitionServices,
};
use tracing_subscriber::EnvFilter;

const REMOTE_LEVEL: &str = "levels/3";

#[tokio::main]
async fn main() -> scene_switch_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_transition(&args).await,
        Commands::Plan(args) => print_plan(&args),
    }
}

async fn run_transition(args: &TransitionArgs) -> scene_switch_core::Result<()> {
    let runner = demo_runner(args)?;
    let request = build_request(args);
    tracing::info!(from = %args.from, to = %args.to, "starting transition");

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling transition");
                token.cancel();
            }
        });
    }
    if let Some(ms) = args.cancel_after_ms {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            tracing::info!(after_ms = ms, "cancelling transition");
            token.cancel();
        });
    }

    let result = runner.run(request, &token).await;
    log_world(runner.world())?;
    match result {
        Ok(outcome) => {
            tracing::info!(
                destination = %outcome.destination,
                steps = outcome.executed.len(),
                elapsed = ?outcome.elapsed,
                "transition complete"
            );
            Ok(())
        }
        Err(err) => {
            if let Some(report) = runner.last_cleanup()? {
                for action in &report.performed {
                    tracing::info!(%action, "compensated");
                }
                for (action, reason) in &report.failures {
                    tracing::warn!(%action, %reason, "compensation failed");
                }
            }
            Err(err)
        }
    }
}

fn print_plan(args: &TransitionArgs) -> scene_switch_core::Result<()> {
    let runner = demo_runner(args)?;
    for (index, kind) in runner.describe(&build_request(args)).iter().enumerate() {
        println!("{:>2}. {kind}", index + 1);
    }
    Ok(())
}

fn build_request(args: &TransitionArgs) -> TransitionRequest {
    let mut request = TransitionRequest::to(args.to.as_str())
        .with_events(Arc::new(TracingEvents))
        .with_progress(Arc::new(|progress: f32| {
            tracing::debug!(progress, "load progress");
        }));
    if args.additive {
        request = request.additive();
    }
    if !args.no_quarantine {
        request = request.with_quarantine();
    }
    match args.loading {
        LoadingArg::None => {}
        LoadingArg::Overlay => {
            request = request
                .with_loading_indicator()
                .indicator_strategy(IndicatorStrategy::Overlay)
        }
        LoadingArg::Scene => {
            request = request
                .with_loading_indicator()
                .indicator_strategy(IndicatorStrategy::Scene)
        }
    }
    request
}

/// Builds a small world with a menu, two native levels, a loading scene and
/// one level served from the in-memory remote catalog.
fn demo_runner(args: &TransitionArgs) -> scene_switch_core::Result<TransitionRunner> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };
    if !config.scenes.iter().any(|entry| entry.name == "Level3") {
        config.scenes.push(SceneEntry {
            name: "Level3".to_string(),
            backend: Backend::Remote,
            native_id: None,
            remote_address: Some(REMOTE_LEVEL.to_string()),
        });
    }

    let world = SceneWorld::new();
    world.register_blueprint(
        SceneBlueprint::new("MainMenu")
            .with_object(ObjectBlueprint::new("Camera"))
            .with_object(ObjectBlueprint::new("Menu").with_child(ObjectBlueprint::new("Play"))),
    )?;
    world.register_blueprint(
        SceneBlueprint::new("Level1").with_object(ObjectBlueprint::new("Terrain")),
    )?;
    world.register_blueprint(
        SceneBlueprint::new("Level2")
            .with_load_steps(8)
            .with_object(ObjectBlueprint::new("Terrain"))
            .with_object(
                ObjectBlueprint::new("Player").with_transform(Transform::at([0.0, 1.0, 0.0])),
            ),
    )?;
    world.register_blueprint(SceneBlueprint::new(config.loading.indicator_scene.clone()))?;

    let origin = world
        .blueprint(&args.from)?
        .ok_or_else(|| SceneSwitchError::msg(format!("unknown origin scene `{}`", args.from)))?;
    world.instantiate(&origin, ScenePhase::Integrated, None)?;

    let tick = config.transition.progress_tick();
    let catalog = Arc::new(InMemoryRemoteCatalog::new(tick));
    catalog.insert(
        REMOTE_LEVEL,
        SceneBlueprint::new("Level3").with_object(ObjectBlueprint::new("Boss")),
    )?;
    if args.fail_remote {
        catalog.fail(REMOTE_LEVEL, FetchError::Unavailable("demo outage".to_string()))?;
    }

    let native = Arc::new(NativeContentLoader::new(world.clone(), tick));
    let remote = Arc::new(RemoteContentLoader::new(world.clone(), catalog));
    let services = TransitionServices {
        world: world.clone(),
        loader: Arc::new(DispatchingLoader::new(world.clone(), native, remote)),
        resolver: SceneKeyResolver::new(world.clone(), &config.scenes),
        fader: Some(Arc::new(TimedFader::new(tick))),
        input: Some(Arc::new(CountingInputBlocker::new())),
        config,
    };
    Ok(TransitionRunner::new(services))
}

fn log_world(world: &SceneWorld) -> scene_switch_core::Result<()> {
    let active = world.active_scene()?;
    for scene in world.loaded_scenes()? {
        let objects = world.objects_in(scene.id)?.len();
        let is_active = active.as_ref() == Some(&scene);
        tracing::info!(scene = %scene, objects, active = is_active, "loaded scene");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Scene transition orchestration demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one transition against the demo world.
    Run(TransitionArgs),
    /// Print the steps a transition would execute without running it.
    Plan(TransitionArgs),
}

#[derive(Args, Debug)]
struct TransitionArgs {
    /// Scene loaded before the transition starts.
    #[arg(long, default_value = "MainMenu")]
    from: String,
    /// Destination scene.
    #[arg(long, default_value = "Level2")]
    to: String,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Load next to the origin instead of replacing it.
    #[arg(long)]
    additive: bool,
    /// Do not quarantine objects spawned during the transition.
    #[arg(long)]
    no_quarantine: bool,
    /// Loading indicator to show.
    #[arg(long, value_enum, default_value_t = LoadingArg::Overlay)]
    loading: LoadingArg,
    /// Cancel the transition after this many milliseconds.
    #[arg(long)]
    cancel_after_ms: Option<u64>,
    /// Make the remote catalog fail every fetch.
    #[arg(long)]
    fail_remote: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LoadingArg {
    Overlay,
    Scene,
    None,
}
