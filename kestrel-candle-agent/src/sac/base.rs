use super::{
    archive::{
        self, count_tensor, flag_tensor, read_count, read_flag, read_real, real_tensor, Group,
    },
    critic::min_q,
    Actor, CriticPair, EntCoef, SacConfig,
};
use crate::{
    model::{SubModel1, SubModel2},
    opt::OptimizerConfig,
    util::{finite_loss, no_grad, to_tensor1, OutDim},
    TensorBatch, TensorReplayBuffer,
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::loss::mse;
use kestrel_core::{
    generic_replay_buffer::GenericTransitionBatch,
    record::{Record, RecordValue},
    Algorithm, Env, ExperienceBufferBase, GroupSelection, ReplayBufferBase, Step,
    TrainingState, TransitionBatch,
};
use log::{trace, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::HashMap, path::Path};

/// Soft Q target `r + (1 - done) * gamma * (min Q'(s', a') - alpha * log_p(a'|s'))`.
///
/// `alpha` has shape `[1]`, the other tensors `[batch]`.
pub fn soft_q_target(
    reward: &Tensor,
    is_done: &Tensor,
    gamma: f64,
    next_q_min: &Tensor,
    alpha: &Tensor,
    next_log_p: &Tensor,
) -> Result<Tensor> {
    let next_q = (next_q_min - alpha.broadcast_mul(next_log_p)?)?;
    let not_done = ((1.0 - is_done)? * gamma)?;
    Ok((reward + (not_done * next_q)?)?)
}

fn mean(v: &[f32]) -> f32 {
    v.iter().sum::<f32>() / v.len() as f32
}

/// Soft actor critic (SAC) agent.
///
/// Owns the environment it is trained on, the replay buffer, the actor, a
/// pair of critics with their target networks and the entropy coefficient.
pub struct Sac<E, Q, P>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
{
    config: SacConfig<Q::Config, P::Config>,
    env: E,
    obs: E::Obs,
    buffer: TensorReplayBuffer,
    actor: Actor<P>,
    critic: CriticPair<Q>,
    ent_coef: EntCoef,
    device: Device,
    num_polyak_updates: usize,
}

type Components<Q, P> = (TensorReplayBuffer, Actor<P>, CriticPair<Q>, EntCoef);

impl<E, Q, P> Sac<E, Q, P>
where
    E: Env,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor> + Into<Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`Sac`] and resets the environment.
    pub fn build(config: SacConfig<Q::Config, P::Config>, mut env: E) -> Result<Self> {
        config.validate()?;
        let device = config.device.build()?;
        let (buffer, actor, critic, ent_coef) = Self::build_components(&config, &device)?;
        let obs = env.reset()?;

        Ok(Self {
            config,
            env,
            obs,
            buffer,
            actor,
            critic,
            ent_coef,
            device,
            num_polyak_updates: 0,
        })
    }

    fn build_components(
        config: &SacConfig<Q::Config, P::Config>,
        device: &Device,
    ) -> Result<Components<Q, P>> {
        let buffer = TensorReplayBuffer::build(&config.replay_buffer_config);
        let actor = Actor::build(config.actor_config.clone(), config.lr, device)?;
        let critic = CriticPair::build(config.critic_config.clone(), config.lr, device)?;

        // The default target entropy depends on the action space of the buffer.
        let ent_coef = EntCoef::build(
            config.ent_coef_mode(),
            &OptimizerConfig::Adam { lr: config.lr },
            &buffer.action_sizes(),
            device,
        )?;

        Ok((buffer, actor, critic, ent_coef))
    }

    /// Takes an action in the environment and stores the transition.
    fn step(&mut self, act: E::Act) -> Result<()> {
        let step: Step<E> = self.env.step(&act)?;
        let next_obs = step.next_obs();
        let Step {
            obs,
            reward,
            is_done,
            ..
        } = step;

        self.buffer.push(GenericTransitionBatch {
            obs: TensorBatch::from_tensor(self.obs.clone().into()),
            act: TensorBatch::from_tensor(act.into()),
            next_obs: TensorBatch::from_tensor(obs.into()),
            reward,
            is_done,
        })?;
        self.obs = next_obs;
        Ok(())
    }

    fn batch(&mut self) -> Result<(Tensor, Tensor, Tensor, Vec<f32>, Vec<i8>)> {
        let (obs, act, next_obs, reward, is_done) =
            self.buffer.batch(self.config.batch_size)?.unpack();
        Ok((
            obs.into_tensor()?.to_device(&self.device)?,
            act.into_tensor()?.to_device(&self.device)?,
            next_obs.into_tensor()?.to_device(&self.device)?,
            reward,
            is_done,
        ))
    }

    fn groups() -> Vec<Group<Self>> {
        vec![
            Group::new(
                "actor",
                |s: &Self| s.actor.export(),
                |s: &mut Self, t: &HashMap<String, Tensor>| s.actor.import(t),
            ),
            Group::new(
                "critic",
                |s: &Self| s.critic.export(),
                |s: &mut Self, t: &HashMap<String, Tensor>| s.critic.import(t),
            ),
            Group::new(
                "critic_target",
                |s: &Self| s.critic.export_target(),
                |s: &mut Self, t: &HashMap<String, Tensor>| s.critic.import_target(t),
            ),
            Group::new(
                "actor_optimizer",
                |s: &Self| s.actor.optimizer().state(),
                |s: &mut Self, t: &HashMap<String, Tensor>| s.actor.optimizer_mut().load_state(t),
            ),
            Group::new(
                "critic_optimizer",
                |s: &Self| s.critic.optimizer().state(),
                |s: &mut Self, t: &HashMap<String, Tensor>| {
                    s.critic.optimizer_mut().load_state(t)
                },
            ),
            Group::new(
                "ent_coef_optimizer",
                |s: &Self| match s.ent_coef.optimizer() {
                    Some(opt) => opt.state(),
                    None => Ok(vec![]),
                },
                |s: &mut Self, t: &HashMap<String, Tensor>| match s.ent_coef.optimizer_mut() {
                    Some(opt) => opt.load_state(t),
                    None => {
                        warn!("Ignored ent_coef_optimizer, the entropy coefficient is fixed");
                        Ok(())
                    }
                },
            ),
            Group::new("hparams", Self::save_hparams, Self::load_hparams),
        ]
    }

    fn save_hparams(&self) -> Result<Vec<(String, Tensor)>> {
        let c = &self.config;
        let mut hparams = vec![
            ("learning_starts", count_tensor(c.learning_starts)?),
            ("batch_size", count_tensor(c.batch_size)?),
            ("lr", real_tensor(c.lr)?),
            ("tau", real_tensor(c.tau)?),
            ("gamma", real_tensor(c.gamma)?),
            ("ent_coef", real_tensor(c.ent_coef)?),
            ("auto_ent_coef", flag_tensor(c.auto_ent_coef)?),
            ("train_freq", count_tensor(c.train_freq)?),
            ("gradient_steps", count_tensor(c.gradient_steps)?),
            ("target_update_interval", count_tensor(c.target_update_interval)?),
        ]
        .into_iter()
        .map(|(k, t)| (k.to_string(), t))
        .collect::<Vec<_>>();
        // The effective value, including the default derived from the action space.
        if let Some(target_entropy) = self.ent_coef.target_entropy() {
            hparams.push(("target_entropy".to_string(), real_tensor(target_entropy)?));
        }
        hparams.extend(self.ent_coef.state()?);
        Ok(hparams)
    }

    fn load_hparams(&mut self, t: &HashMap<String, Tensor>) -> Result<()> {
        let c = &mut self.config;
        for (name, field) in vec![
            ("learning_starts", &mut c.learning_starts),
            ("batch_size", &mut c.batch_size),
            ("train_freq", &mut c.train_freq),
            ("gradient_steps", &mut c.gradient_steps),
            ("target_update_interval", &mut c.target_update_interval),
        ] {
            if let Some(v) = read_count(t, name)? {
                *field = v;
            }
        }
        for (name, field) in vec![
            ("tau", &mut c.tau),
            ("gamma", &mut c.gamma),
            ("ent_coef", &mut c.ent_coef),
        ] {
            if let Some(v) = read_real(t, name)? {
                *field = v;
            }
        }

        if let Some(lr) = read_real(t, "lr")? {
            c.lr = lr;
            self.actor.optimizer_mut().set_learning_rate(lr);
            self.critic.optimizer_mut().set_learning_rate(lr);
            if let Some(opt) = self.ent_coef.optimizer_mut() {
                opt.set_learning_rate(lr);
            }
        }

        // The representation of the entropy coefficient is fixed at construction.
        if let Some(auto) = read_flag(t, "auto_ent_coef")? {
            if auto != self.ent_coef.is_auto() {
                warn!(
                    "Ignored auto_ent_coef = {}, the entropy coefficient is {}",
                    auto,
                    if self.ent_coef.is_auto() { "tuned automatically" } else { "fixed" }
                );
            }
        }
        if let Some(target_entropy) = read_real(t, "target_entropy")? {
            if self.ent_coef.is_auto() {
                self.config.target_entropy = Some(target_entropy);
                self.ent_coef.set_target_entropy(target_entropy);
            } else {
                warn!("Ignored target_entropy, the entropy coefficient is fixed");
            }
        }

        self.ent_coef.load_state(t)
    }

    /// Configuration of the agent, including loaded hyper-parameters.
    pub fn config(&self) -> &SacConfig<Q::Config, P::Config> {
        &self.config
    }

    /// The replay buffer.
    pub fn buffer(&self) -> &TensorReplayBuffer {
        &self.buffer
    }

    /// The actor.
    pub fn actor(&self) -> &Actor<P> {
        &self.actor
    }

    /// The critics and their target networks.
    pub fn critic(&self) -> &CriticPair<Q> {
        &self.critic
    }

    /// The entropy coefficient.
    pub fn ent_coef(&self) -> &EntCoef {
        &self.ent_coef
    }

    /// The environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Number of Polyak updates of the target critics since the last reset.
    pub fn num_polyak_updates(&self) -> usize {
        self.num_polyak_updates
    }
}

impl<E, Q, P> Algorithm for Sac<E, Q, P>
where
    E: Env,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor> + Into<Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    type Obs = E::Obs;
    type Act = E::Act;
    type HiddenState = ();

    fn reset(&mut self) -> Result<()> {
        let (buffer, actor, critic, ent_coef) = Self::build_components(&self.config, &self.device)?;
        self.buffer = buffer;
        self.actor = actor;
        self.critic = critic;
        self.ent_coef = ent_coef;
        self.obs = self.env.reset()?;
        self.num_polyak_updates = 0;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()
    }

    fn register_log_items(&self, log_items: &mut Record) {
        for key in ["ent_coef", "actor_loss", "critic_loss", "q_value", "reward"].iter() {
            log_items.register(*key);
        }
        if self.ent_coef.is_auto() {
            log_items.register("ent_coef_loss");
        }
    }

    fn collect_rollouts(&mut self, state: &mut TrainingState) -> Result<()> {
        if state.iteration == 0 {
            for _ in 0..self.config.learning_starts {
                let act = self.env.sample_action()?;
                self.step(act)?;
            }
        }

        for _ in 0..self.config.train_freq {
            let obs: Tensor = self.obs.clone().into();
            let act = no_grad(|| self.actor.predict_action(&obs))?;
            self.step(act.into())?;
            state.time_steps += self.env.num_envs();
        }
        Ok(())
    }

    fn train(&mut self, state: &mut TrainingState, log_items: &mut Record) -> Result<()> {
        let gradient_steps = self.config.gradient_steps;
        let mut ent_coefs = Vec::with_capacity(gradient_steps);
        let mut ent_coef_losses = Vec::with_capacity(gradient_steps);
        let mut critic_losses = Vec::with_capacity(gradient_steps);
        let mut actor_losses = Vec::with_capacity(gradient_steps);
        let mut q_values = Vec::with_capacity(gradient_steps);
        let mut rewards = Vec::with_capacity(gradient_steps);

        for step in 0..gradient_steps {
            trace!("gradient step {}", step);
            let (obs, act, next_obs, reward, is_done) = self.batch()?;
            rewards.push(mean(&reward));
            let reward = to_tensor1(&reward, &self.device)?;
            let is_done = is_done.iter().map(|&d| d as f32).collect::<Vec<_>>();
            let is_done = to_tensor1(&is_done, &self.device)?;

            // Entropy coefficient
            let (_, log_p) = self.actor.predict_action_log_prob(&obs)?;
            let alpha = self.ent_coef.alpha()?;
            ent_coefs.push(alpha.to_vec1::<f32>()?[0]);
            if let Some(loss) = self.ent_coef.update(&log_p)? {
                ent_coef_losses.push(loss);
            }

            // Critics
            let target = no_grad(|| {
                let (next_act, next_log_p) = self.actor.predict_action_log_prob(&next_obs)?;
                let next_q = min_q(&self.critic.forward_target(&next_obs, &next_act)?)?;
                soft_q_target(
                    &reward,
                    &is_done,
                    self.config.gamma,
                    &next_q,
                    &alpha,
                    &next_log_p,
                )
            })?;
            let qs = self.critic.forward(&obs, &act)?;
            q_values.push(min_q(&qs)?.detach().mean_all()?.to_scalar::<f32>()?);
            let losses = qs
                .iter()
                .map(|q| -> Result<Tensor> { Ok(mse(q, &target)?) })
                .collect::<Result<Vec<_>>>()?;
            let critic_loss = (Tensor::stack(&losses, 0)?.sum_all()? / losses.len() as f64)?;
            critic_losses.push(finite_loss("critic_loss", &critic_loss)?);
            self.critic.backward_step(&critic_loss)?;

            // Actor
            let (act_pi, log_p) = self.actor.predict_action_log_prob(&obs)?;
            let q_pi = min_q(&self.critic.forward(&obs, &act_pi)?)?;
            let actor_loss = (alpha.broadcast_mul(&log_p)? - q_pi)?.mean_all()?;
            actor_losses.push(finite_loss("actor_loss", &actor_loss)?);
            self.actor.backward_step(&actor_loss)?;

            if step % self.config.target_update_interval == 0 {
                self.critic.polyak_update(self.config.tau)?;
                self.num_polyak_updates += 1;
            }
        }

        state.num_updates += gradient_steps;
        if gradient_steps > 0 {
            log_items.insert("ent_coef", RecordValue::Scalar(mean(&ent_coefs)));
            log_items.insert("actor_loss", RecordValue::Scalar(mean(&actor_losses)));
            log_items.insert("critic_loss", RecordValue::Scalar(mean(&critic_losses)));
            log_items.insert("q_value", RecordValue::Scalar(mean(&q_values)));
            log_items.insert("reward", RecordValue::Scalar(mean(&rewards)));
            if !ent_coef_losses.is_empty() {
                log_items.insert("ent_coef_loss", RecordValue::Scalar(mean(&ent_coef_losses)));
            }
        }
        Ok(())
    }

    fn predict(
        &mut self,
        obs: &E::Obs,
        deterministic: bool,
        _state: Option<&()>,
        _episode_start: Option<&[bool]>,
    ) -> Result<(E::Act, Option<()>)> {
        let obs: Tensor = obs.clone().into();
        let obs = obs.to_device(&self.device)?;
        let act = no_grad(|| self.actor.predict(&obs, deterministic))?;
        Ok((act.into(), None))
    }

    fn save(&self, path: &Path, selection: &GroupSelection) -> Result<()> {
        archive::save(self, &Self::groups(), selection, path)
    }

    fn load(&mut self, path: &Path, selection: &GroupSelection) -> Result<()> {
        archive::load(self, &Self::groups(), selection, path)
    }

    fn checkpoint_extension(&self) -> &'static str {
        "safetensors"
    }
}
