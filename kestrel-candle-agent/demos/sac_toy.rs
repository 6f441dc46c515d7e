use anyhow::Result;
use clap::Parser;
use kestrel_candle_agent::{
    mlp::{Mlp, Mlp2, MlpConfig},
    point_mass::{PointMass, PointMassConfig, ACT_DIM, OBS_DIM},
    sac::{ActorConfig, CriticConfig, Sac, SacConfig},
};
use kestrel_core::{
    generic_replay_buffer::SimpleReplayBufferConfig, Env as _, GroupSelection,
    TrainingLoop, TrainingLoopConfig,
};
use log::info;

type SacAgent = Sac<PointMass, Mlp, Mlp2>;

const DIM_OBS: i64 = OBS_DIM as i64;
const DIM_ACT: i64 = ACT_DIM as i64;
const REPLAY_BUFFER_CAPACITY: usize = 100_000;

/// Train a SAC agent on a point mass
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Prefix of the log file and checkpoints. Nothing is written if empty
    #[arg(long, default_value_t = String::from("sac_toy"))]
    output_path: String,

    /// Total number of environment steps
    #[arg(long, default_value_t = 10_000)]
    max_time_steps: usize,

    /// Interval of console and file logs in iterations, disabled if <= 0
    #[arg(long, default_value_t = 500)]
    monitor_interval: i64,

    /// Interval of checkpoints in iterations, disabled if <= 0
    #[arg(long, default_value_t = 5_000)]
    checkpoint_interval: i64,

    /// Number of parallel environments
    #[arg(long, default_value_t = 1)]
    num_envs: usize,

    /// Random seed of the environment
    #[arg(long, default_value_t = 42)]
    seed: i64,

    /// Checkpoint to resume from
    #[arg(long)]
    resume: Option<String>,
}

fn create_sac_config() -> SacConfig<MlpConfig, MlpConfig> {
    let actor_config =
        ActorConfig::default().pi_config(MlpConfig::new(DIM_OBS, vec![64, 64], DIM_ACT, false));
    let critic_config = CriticConfig::default()
        .q_config(MlpConfig::new(DIM_OBS + DIM_ACT, vec![64, 64], 1, false));
    let replay_buffer_config = SimpleReplayBufferConfig::default()
        .capacity(REPLAY_BUFFER_CAPACITY)
        .action_sizes(vec![ACT_DIM]);

    SacConfig::default()
        .learning_starts(1_000)
        .batch_size(256)
        .actor_config(actor_config)
        .critic_config(critic_config)
        .replay_buffer_config(replay_buffer_config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let env_config = PointMassConfig::default().num_envs(args.num_envs);
    let env = PointMass::build(&env_config, args.seed)?;
    let agent = SacAgent::build(create_sac_config(), env)?;
    let config = TrainingLoopConfig::default().output_path(args.output_path.clone());
    let mut training_loop = TrainingLoop::build(agent, &config)?;

    if let Some(path) = &args.resume {
        training_loop.load(path, &GroupSelection::All)?;
    }

    training_loop.learn(
        args.max_time_steps,
        args.monitor_interval,
        args.checkpoint_interval,
    )?;

    let (act, _) = training_loop.predict(
        &PointMass::build(&env_config, args.seed + 1)?.reset()?,
        true,
        None,
        None,
    )?;
    info!("Deterministic action at a fresh start: {:?}", act.0.to_vec2::<f32>()?);
    Ok(())
}
