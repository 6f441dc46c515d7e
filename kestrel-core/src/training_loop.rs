//! Off-policy training loop.
mod config;
use crate::{
    checkpoint::{checkpoint_path, log_path, timestamp},
    record::{ConsoleRecorder, Record, RecordValue, Recorder, TsvRecorder},
    Algorithm, GroupSelection, TrainingState,
};
use anyhow::Result;
pub use config::TrainingLoopConfig;
use log::{info, trace};
use std::path::{Path, PathBuf};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Drives an [`Algorithm`] through the iterations of a training run.
///
/// # Training loop
///
/// [`TrainingLoop::learn`] repeats the following cycle while
/// [`TrainingLoop::proceed`] holds, i.e. while
/// `time_steps < max_time_steps`:
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Idle
///     Idle --> Collecting: learn
///     Collecting --> Training
///     Training --> Monitoring
///     Monitoring --> Checkpointing
///     Checkpointing --> Updated
///     Updated --> Collecting: proceed
///     Updated --> [*]: time_steps >= max_time_steps
/// ```
///
/// 1. [`Algorithm::collect_rollouts`] interacts with the environment and
///    advances `time_steps`.
/// 2. [`Algorithm::train`] performs gradient updates and publishes
///    diagnostics into the log items.
/// 3. If `monitor_interval > 0` and `iteration % monitor_interval == 0`,
///    a row of the log items is written to every recorder: a table on the
///    console and a line of `{output_path}_log.txt`.
/// 4. If `checkpoint_interval > 0`, `iteration % checkpoint_interval == 0`
///    and an output path is configured, the whole state of the algorithm is
///    saved to `{output_path}_{timestamp}_{time_steps}.{ext}`.
/// 5. `iteration += 1`.
///
/// Cadences are counted in iterations, not in environment steps.
pub struct TrainingLoop<A: Algorithm> {
    algorithm: A,

    /// Counters of the run.
    state: TrainingState,

    /// Termination threshold of `time_steps`.
    max_time_steps: usize,

    /// Interval of monitoring in iterations, disabled if `<= 0`.
    monitor_interval: i64,

    /// Interval of checkpointing in iterations, disabled if `<= 0`.
    checkpoint_interval: i64,

    /// Prefix of output files.
    output_path: Option<String>,

    /// The most recent value of every registered metric.
    log_items: Record,

    recorders: Vec<Box<dyn Recorder>>,
}

impl<A: Algorithm> TrainingLoop<A> {
    /// Constructs a training loop around an algorithm.
    ///
    /// The algorithm is expected to be freshly built, so it is not reset
    /// here. The counters are zeroed, log items are registered and, when an
    /// output path is configured, the header of the log file is written.
    pub fn build(algorithm: A, config: &TrainingLoopConfig) -> Result<Self> {
        let output_path = config.output_path.clone().filter(|p| !p.is_empty());
        let mut recorders: Vec<Box<dyn Recorder>> = vec![];
        if config.console {
            recorders.push(Box::new(ConsoleRecorder::new()));
        }
        if let Some(output_path) = &output_path {
            recorders.push(Box::new(TsvRecorder::new(log_path(output_path))));
        }

        let mut training_loop = Self {
            algorithm,
            state: TrainingState::default(),
            max_time_steps: 0,
            monitor_interval: 0,
            checkpoint_interval: 0,
            output_path,
            log_items: Record::empty(),
            recorders,
        };
        training_loop.reset_log_items()?;
        Ok(training_loop)
    }

    /// Adds a recorder receiving every monitored row.
    pub fn add_recorder(&mut self, mut recorder: Box<dyn Recorder>) -> Result<()> {
        recorder.reset(&self.columns())?;
        self.recorders.push(recorder);
        Ok(())
    }

    /// Rebuilds the algorithm, zeroes the counters and re-registers the log
    /// items, writing a fresh log file header.
    pub fn reset(&mut self) -> Result<()> {
        self.algorithm.reset()?;
        self.reset_log_items()
    }

    fn reset_log_items(&mut self) -> Result<()> {
        self.state = TrainingState::default();
        self.log_items = Record::empty();
        self.log_items.register("num_updates");
        self.algorithm.register_log_items(&mut self.log_items);

        let columns = self.columns();
        for recorder in self.recorders.iter_mut() {
            recorder.reset(&columns)?;
        }
        Ok(())
    }

    /// Column names of a monitored row.
    fn columns(&self) -> Vec<String> {
        std::iter::once("time_steps")
            .chain(self.log_items.keys())
            .map(String::from)
            .collect()
    }

    /// Returns `true` while `time_steps < max_time_steps`.
    pub fn proceed(&self) -> bool {
        self.state.time_steps < self.max_time_steps
    }

    /// Runs the training loop until `max_time_steps` environment steps have
    /// been taken.
    ///
    /// `time_steps` restarts from zero, while `iteration` and `num_updates`
    /// carry over from previous calls. The configuration of the algorithm is
    /// validated before the first iteration.
    pub fn learn(
        &mut self,
        max_time_steps: usize,
        monitor_interval: i64,
        checkpoint_interval: i64,
    ) -> Result<()> {
        self.max_time_steps = max_time_steps;
        self.monitor_interval = monitor_interval;
        self.checkpoint_interval = checkpoint_interval;
        self.state.time_steps = 0;
        self.algorithm.validate()?;
        info!(
            "Start training: max_time_steps = {}, monitor_interval = {}, checkpoint_interval = {}",
            max_time_steps, monitor_interval, checkpoint_interval
        );

        while self.proceed() {
            self.collect_rollouts()?;
            self.train()?;
            self.monitor()?;
            self.checkpoint()?;
            self.update();
        }

        info!(
            "Finished training: iteration = {}, time_steps = {}, num_updates = {}",
            self.state.iteration, self.state.time_steps, self.state.num_updates
        );
        Ok(())
    }

    /// Asks the algorithm to collect experience.
    pub fn collect_rollouts(&mut self) -> Result<()> {
        self.algorithm.collect_rollouts(&mut self.state)
    }

    /// Asks the algorithm to update its parameters.
    pub fn train(&mut self) -> Result<()> {
        self.algorithm.train(&mut self.state, &mut self.log_items)?;
        self.log_items.insert(
            "num_updates",
            RecordValue::Int(self.state.num_updates as i64),
        );
        trace!("iteration = {}: {:?}", self.state.iteration, self.log_items);
        Ok(())
    }

    /// Writes the current log items to every recorder if the monitoring
    /// cadence fires at the current iteration.
    ///
    /// Returns `true` if a row was written.
    pub fn monitor(&mut self) -> Result<bool> {
        if !is_due(self.state.iteration, self.monitor_interval) {
            return Ok(false);
        }

        let row = Record::from_slice(&[(
            "time_steps",
            RecordValue::Int(self.state.time_steps as i64),
        )])
        .merge(self.log_items.clone());
        for recorder in self.recorders.iter_mut() {
            recorder.write(&row)?;
        }
        Ok(true)
    }

    /// Saves a checkpoint if the checkpointing cadence fires at the current
    /// iteration and an output path is configured.
    ///
    /// Returns the path of the checkpoint file if one was written.
    pub fn checkpoint(&mut self) -> Result<Option<PathBuf>> {
        let output_path = match &self.output_path {
            Some(output_path) if is_due(self.state.iteration, self.checkpoint_interval) => {
                output_path
            }
            _ => return Ok(None),
        };

        let path = checkpoint_path(
            output_path,
            &timestamp(),
            self.state.time_steps,
            self.algorithm.checkpoint_extension(),
        );
        self.algorithm.save(&path, &GroupSelection::All)?;
        info!("Saved checkpoint to {:?}", path);
        Ok(Some(path))
    }

    /// Advances the iteration counter.
    pub fn update(&mut self) {
        self.state.iteration += 1;
    }

    /// Returns an action of the trained policy.
    pub fn predict(
        &mut self,
        obs: &A::Obs,
        deterministic: bool,
        state: Option<&A::HiddenState>,
        episode_start: Option<&[bool]>,
    ) -> Result<(A::Act, Option<A::HiddenState>)> {
        self.algorithm
            .predict(obs, deterministic, state, episode_start)
    }

    /// Saves the selected groups of the algorithm.
    pub fn save(&self, path: impl AsRef<Path>, groups: &GroupSelection) -> Result<()> {
        self.algorithm.save(path.as_ref(), groups)?;
        info!("Saved {:?} to {:?}", groups, path.as_ref());
        Ok(())
    }

    /// Loads the selected groups of the algorithm.
    pub fn load(&mut self, path: impl AsRef<Path>, groups: &GroupSelection) -> Result<()> {
        self.algorithm.load(path.as_ref(), groups)?;
        info!("Loaded {:?} from {:?}", groups, path.as_ref());
        Ok(())
    }

    /// Counters of the run.
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// The most recent log items.
    pub fn log_items(&self) -> &Record {
        &self.log_items
    }

    /// The algorithm.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// The algorithm.
    pub fn algorithm_mut(&mut self) -> &mut A {
        &mut self.algorithm
    }

    /// Path of the log file, if an output path is configured.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.output_path.as_deref().map(log_path)
    }
}

fn is_due(iteration: usize, interval: i64) -> bool {
    interval > 0 && iteration as i64 % interval == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dummy::DummyAlgorithm, error::RlError};
    use std::{cell::RefCell, rc::Rc};
    use tempdir::TempDir;

    /// Keeps every written row.
    struct RowCollector(Rc<RefCell<Vec<Record>>>);

    impl Recorder for RowCollector {
        fn write(&mut self, record: &Record) -> Result<()> {
            self.0.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    fn quiet() -> TrainingLoopConfig {
        TrainingLoopConfig::default().console(false)
    }

    fn with_collector(training_loop: &mut TrainingLoop<DummyAlgorithm>) -> Rc<RefCell<Vec<Record>>> {
        let rows = Rc::new(RefCell::new(vec![]));
        training_loop
            .add_recorder(Box::new(RowCollector(rows.clone())))
            .unwrap();
        rows
    }

    #[test]
    fn test_proceed_is_the_termination_predicate() -> Result<()> {
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(3), &quiet())?;
        training_loop.learn(10, 0, 0)?;

        // 4 iterations reach 12 >= 10 time steps.
        assert_eq!(training_loop.state().iteration, 4);
        assert_eq!(training_loop.state().time_steps, 12);
        assert_eq!(training_loop.algorithm().num_collects, 4);
        assert_eq!(training_loop.algorithm().num_trains, 4);
        assert!(!training_loop.proceed());
        Ok(())
    }

    #[test]
    fn test_no_iteration_when_max_time_steps_is_zero() -> Result<()> {
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(1), &quiet())?;
        let rows = with_collector(&mut training_loop);
        training_loop.learn(0, 1, 1)?;

        assert_eq!(*training_loop.state(), TrainingState::default());
        assert_eq!(training_loop.algorithm().num_collects, 0);
        assert!(rows.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_learn_restarts_time_steps_only() -> Result<()> {
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(2), &quiet())?;
        training_loop.learn(4, 0, 0)?;
        training_loop.learn(4, 0, 0)?;

        let state = training_loop.state();
        assert_eq!(state.iteration, 4);
        assert_eq!(state.time_steps, 4);
        assert_eq!(state.num_updates, 4);

        training_loop.reset()?;
        assert_eq!(*training_loop.state(), TrainingState::default());
        assert_eq!(training_loop.algorithm().num_resets, 1);
        Ok(())
    }

    #[test]
    fn test_monitor_cadence() -> Result<()> {
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(1), &quiet())?;
        let rows = with_collector(&mut training_loop);
        training_loop.learn(7, 3, 0)?;

        // Iterations 0, 3 and 6 are monitored, after collecting 1, 4 and 7 steps.
        let time_steps = rows
            .borrow()
            .iter()
            .map(|r| r.get_int("time_steps").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(time_steps, vec![1, 4, 7]);

        let row = &rows.borrow()[0];
        assert_eq!(
            row.keys().collect::<Vec<_>>(),
            vec!["time_steps", "num_updates", "loss", "is_warm"]
        );
        assert_eq!(row.get_int("num_updates")?, 1);
        Ok(())
    }

    #[test]
    fn test_non_positive_intervals_disable_phases() -> Result<()> {
        let dir = TempDir::new("training_loop")?;
        let output_path = dir.path().join("run").to_string_lossy().to_string();
        let config = quiet().output_path(output_path);

        for interval in [0, -1] {
            let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(1), &config)?;
            let rows = with_collector(&mut training_loop);
            training_loop.learn(5, interval, interval)?;
            assert!(rows.borrow().is_empty());
            assert!(training_loop.algorithm().saved_paths().is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_checkpoint_cadence_and_names() -> Result<()> {
        let dir = TempDir::new("training_loop")?;
        let output_path = dir.path().join("run").to_string_lossy().to_string();
        let config = quiet().output_path(output_path.clone());
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(10), &config)?;
        training_loop.learn(50, 0, 2)?;

        // Iterations 0, 2 and 4 write checkpoints after 10, 30 and 50 steps.
        let saved = training_loop.algorithm().saved_paths();
        assert_eq!(saved.len(), 3);
        for (path, time_steps) in saved.iter().zip([10, 30, 50]) {
            let name = path.to_string_lossy().to_string();
            assert!(name.starts_with(&format!("{}_", output_path)));
            assert!(name.ends_with(&format!("_{}.dummy", time_steps)));
            assert!(path.exists());
        }
        Ok(())
    }

    #[test]
    fn test_checkpoint_requires_output_path() -> Result<()> {
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(1), &quiet())?;
        training_loop.learn(3, 0, 1)?;
        assert!(training_loop.algorithm().saved_paths().is_empty());

        let config = quiet().output_path("");
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(1), &config)?;
        training_loop.learn(3, 1, 1)?;
        assert!(training_loop.algorithm().saved_paths().is_empty());
        assert!(training_loop.log_path().is_none());
        Ok(())
    }

    #[test]
    fn test_log_file() -> Result<()> {
        let dir = TempDir::new("training_loop")?;
        let output_path = dir.path().join("run").to_string_lossy().to_string();
        let config = quiet().output_path(output_path);
        let mut training_loop = TrainingLoop::build(DummyAlgorithm::new(5), &config)?;
        training_loop.learn(10, 1, 0)?;

        let text = std::fs::read_to_string(training_loop.log_path().unwrap())?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "time_steps\tnum_updates\tloss\tis_warm");
        assert_eq!(lines[1], "5\t1\t0.5\t0");
        assert_eq!(lines[2], "10\t2\t0.25\t1");
        assert_eq!(lines.len(), 3);
        Ok(())
    }

    #[test]
    fn test_validation_fails_before_first_iteration() -> Result<()> {
        let mut algorithm = DummyAlgorithm::new(1);
        algorithm.invalid = true;
        let mut training_loop = TrainingLoop::build(algorithm, &quiet())?;
        let err = training_loop.learn(10, 1, 1).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RlError>(),
            Some(RlError::Config(_))
        ));
        assert_eq!(training_loop.algorithm().num_collects, 0);
        Ok(())
    }
}
