use crate::config::SimConfig;
use crate::error::{Result, SimError};
use life_grid::{Grid, GridSize, Loc, Random, Seeder};
use log::{debug, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Paused,
    Running,
}

/// What a renderer needs to draw one frame.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub grid: Arc<Grid>,
    pub generation: u64,
    pub run_state: RunState,
    pub speed_millis: u64,
}

impl Snapshot {
    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn live_cells(&self) -> usize {
        self.grid.live_count()
    }

    pub fn generations_per_second(&self) -> f64 {
        1000.0 / self.speed_millis as f64
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

struct SimState {
    grid: Arc<Grid>,
    generation: u64,
    run_state: RunState,
    speed_millis: u64,
    // Bumped whenever the ticker is armed or disarmed.
    epoch: u64,
    listener: Option<Listener>,
}

impl SimState {
    fn ticks_for(&self, epoch: u64) -> bool {
        self.run_state == RunState::Running && self.epoch == epoch
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            grid: Arc::clone(&self.grid),
            generation: self.generation,
            run_state: self.run_state,
            speed_millis: self.speed_millis,
        }
    }
}

#[derive(Clone)]
struct SharedState(Arc<Mutex<SimState>>);

impl SharedState {
    fn new(state: SimState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `change` under the lock. If it reports a change, the listener is
    /// called after the lock is released.
    fn apply<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut SimState) -> bool,
    {
        let changed = change(&mut self.lock());
        if changed {
            self.notify();
        }
        changed
    }

    fn notify(&self) {
        let listener = self.lock().listener.clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    fn tick_interval(&self, epoch: u64) -> Option<Duration> {
        let state = self.lock();
        state
            .ticks_for(epoch)
            .then(|| Duration::from_millis(state.speed_millis))
    }

    fn tick(&self, epoch: u64) -> bool {
        self.apply(|state| {
            if !state.ticks_for(epoch) {
                return false;
            }
            state.grid = Arc::new(state.grid.next_generation());
            state.generation += 1;
            trace!("generation {}", state.generation);
            true
        })
    }
}

async fn run_ticker(shared: SharedState, epoch: u64) {
    // The interval is read before each sleep, so a speed change only affects
    // ticks scheduled after the pending one.
    while let Some(interval) = shared.tick_interval(epoch) {
        time::sleep(interval).await;
        if !shared.tick(epoch) {
            break;
        }
    }
    trace!("ticker for epoch {epoch} stopped");
}

/// Owns the simulation state and the timer that steps it while running.
/// Every command completes synchronously.
pub struct SimulationController {
    config: SimConfig,
    seeder: Seeder,
    rand: Random,
    shared: SharedState,
    runtime: Handle,
    ticker: Option<JoinHandle<()>>,
}

impl SimulationController {
    /// Starts paused at generation 0 with an all-dead grid, ticking on the
    /// current tokio runtime.
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_runtime(config, Handle::try_current()?, Random::new())
    }

    pub fn with_runtime(config: SimConfig, runtime: Handle, rand: Random) -> Result<Self> {
        config.validate()?;
        let seeder = Seeder::new(config.seed_probability)?;
        let state = SimState {
            grid: Arc::new(Grid::new(config.grid_dimensions())),
            generation: 0,
            run_state: RunState::Paused,
            speed_millis: config.initial_speed_millis,
            epoch: 0,
            listener: None,
        };
        debug!("created {}x{} simulation", config.grid_size, config.grid_size);
        Ok(Self {
            config,
            seeder,
            rand,
            shared: SharedState::new(state),
            runtime,
            ticker: None,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn size(&self) -> GridSize {
        self.config.grid_dimensions()
    }

    /// Called after every change to the snapshot, from whichever thread made it.
    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.lock().listener = Some(Arc::new(listener));
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.lock().snapshot()
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    pub fn run_state(&self) -> RunState {
        self.shared.lock().run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn speed_millis(&self) -> u64 {
        self.shared.lock().speed_millis
    }

    /// Flips cell (`x`, `y`) = (row, col). Returns whether the edit was
    /// applied; edits are ignored while running.
    pub fn toggle_cell(&mut self, x: u32, y: u32) -> Result<bool> {
        let loc = Loc::new(x, y);
        let size = self.size();
        if !size.contains(loc) {
            return Err(SimError::OutOfBounds {
                row: x,
                col: y,
                width: size.width,
                height: size.height,
            });
        }

        let toggled = self.shared.apply(|state| {
            if state.run_state == RunState::Running {
                return false;
            }
            Arc::make_mut(&mut state.grid).toggle(loc);
            true
        });
        if !toggled {
            debug!("ignoring toggle of ({x}, {y}) while running");
        }
        Ok(toggled)
    }

    pub fn randomize(&mut self) {
        let grid = self.seeder.seed(self.size(), &mut self.rand);
        debug!("randomized grid, {} live cells", grid.live_count());
        self.replace_grid(grid);
    }

    pub fn clear(&mut self) {
        debug!("cleared grid");
        self.replace_grid(Grid::new(self.size()));
    }

    fn replace_grid(&mut self, grid: Grid) {
        self.shared.apply(|state| {
            state.grid = Arc::new(grid);
            state.generation = 0;
            true
        });
    }

    pub fn start(&mut self) {
        let mut epoch = 0;
        let started = self.shared.apply(|state| {
            if state.run_state == RunState::Running {
                return false;
            }
            state.run_state = RunState::Running;
            state.epoch += 1;
            epoch = state.epoch;
            true
        });
        if !started {
            return;
        }

        info!("running every {} ms", self.speed_millis());
        let ticker = self.runtime.spawn(run_ticker(self.shared.clone(), epoch));
        if let Some(stale) = self.ticker.replace(ticker) {
            stale.abort();
        }
    }

    pub fn pause(&mut self) {
        if self.disarm() {
            info!("paused at generation {}", self.generation());
            self.shared.notify();
        }
    }

    /// Stops ticking. Once this returns no tick can apply, even one whose
    /// timer has already fired. Returns whether the simulation was running.
    fn disarm(&mut self) -> bool {
        let was_running = {
            let mut state = self.shared.lock();
            let was_running = state.run_state == RunState::Running;
            state.run_state = RunState::Paused;
            state.epoch += 1;
            was_running
        };
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        was_running
    }

    /// Clamps `millis` to the configured bounds and returns the interval that
    /// will be used from the next scheduled tick on.
    pub fn set_speed(&mut self, millis: u64) -> u64 {
        let speed = self.config.clamp_speed(millis);
        if speed != millis {
            warn!("speed {millis} ms clamped to {speed} ms");
        }
        self.shared.apply(|state| {
            let changed = state.speed_millis != speed;
            state.speed_millis = speed;
            changed
        });
        speed
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn controller() -> SimulationController {
        let config = SimConfig {
            grid_size: 8,
            ..SimConfig::default()
        };
        SimulationController::with_runtime(config, Handle::current(), Random::from_seed(3))
            .unwrap()
    }

    fn counting_listener(controller: &mut SimulationController) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let listener_count = Arc::clone(&count);
        controller.set_listener(move || {
            listener_count.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    async fn advance(millis: u64) {
        time::sleep(Duration::from_millis(millis)).await;
    }

    #[test]
    fn new_needs_a_runtime() {
        let result = SimulationController::new(SimConfig::default());
        assert!(matches!(result, Err(SimError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn starts_paused_and_empty() {
        let controller = controller();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.run_state, RunState::Paused);
        assert_eq!(snapshot.generation, 0);
        assert_eq!(snapshot.speed_millis, 100);
        assert_eq!(snapshot.grid.size(), GridSize::square(8));
        assert_eq!(snapshot.live_cells(), 0);
        assert_eq!(snapshot.generations_per_second(), 10.0);
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = SimConfig {
            seed_probability: 2.0,
            ..SimConfig::default()
        };
        let result = SimulationController::with_runtime(config, Handle::current(), Random::new());
        assert!(matches!(result, Err(SimError::InvalidProbability(_))));

        let config = SimConfig {
            grid_size: 0,
            ..SimConfig::default()
        };
        let result = SimulationController::with_runtime(config, Handle::current(), Random::new());
        assert!(matches!(result, Err(SimError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn toggle_twice_while_paused_restores_grid() {
        let mut controller = controller();
        controller.randomize();
        let before = controller.snapshot().grid;

        assert!(controller.toggle_cell(2, 5).unwrap());
        assert_ne!(*controller.snapshot().grid, *before);
        assert!(controller.toggle_cell(2, 5).unwrap());
        assert_eq!(*controller.snapshot().grid, *before);
        assert_eq!(controller.generation(), 0);
    }

    #[tokio::test]
    async fn toggle_out_of_bounds_is_rejected() {
        let mut controller = controller();
        let before = controller.snapshot().grid;
        let result = controller.toggle_cell(8, 0);
        assert!(matches!(
            result,
            Err(SimError::OutOfBounds {
                row: 8,
                col: 0,
                width: 8,
                height: 8
            })
        ));
        assert!(controller.toggle_cell(0, 100).is_err());
        assert_eq!(*controller.snapshot().grid, *before);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_is_ignored_while_running() {
        let mut controller = controller();
        controller.randomize();
        controller.start();
        let before = controller.snapshot();

        assert!(!controller.toggle_cell(3, 3).unwrap());
        let after = controller.snapshot();
        assert_eq!(*after.grid, *before.grid);
        assert_eq!(after.generation, 0);
        assert!(after.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn generation_advances_once_per_tick() {
        let mut controller = controller();
        controller.randomize();
        let initial = controller.snapshot().grid;
        controller.start();

        advance(350).await;
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.generation, 3);
        let expected = initial
            .next_generation()
            .next_generation()
            .next_generation();
        assert_eq!(*snapshot.grid, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn generation_is_frozen_while_paused() {
        let mut controller = controller();
        controller.randomize();
        controller.start();
        advance(250).await;
        controller.pause();
        assert_eq!(controller.generation(), 2);
        assert_eq!(controller.run_state(), RunState::Paused);

        advance(1000).await;
        assert_eq!(controller.generation(), 2);

        controller.start();
        advance(150).await;
        assert_eq!(controller.generation(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn redundant_start_and_pause_are_no_ops() {
        let mut controller = controller();
        controller.start();
        controller.start();
        advance(350).await;
        assert_eq!(controller.generation(), 3);

        controller.pause();
        controller.pause();
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn blinker_oscillates_while_running() {
        let mut controller = controller();
        for col in 2..=4 {
            controller.toggle_cell(3, col).unwrap();
        }
        let horizontal = controller.snapshot().grid;
        controller.start();

        advance(150).await;
        let vertical = controller.snapshot().grid;
        assert_ne!(*vertical, *horizontal);
        for row in 2..=4 {
            assert!(vertical[Loc::new(row, 3)]);
        }
        assert_eq!(vertical.live_count(), 3);

        advance(100).await;
        assert_eq!(controller.generation(), 2);
        assert_eq!(*controller.snapshot().grid, *horizontal);
    }

    #[tokio::test(start_paused = true)]
    async fn randomize_and_clear_reset_generation() {
        let mut controller = controller();
        controller.start();
        advance(250).await;
        assert_eq!(controller.generation(), 2);

        controller.randomize();
        assert_eq!(controller.generation(), 0);
        assert!(controller.is_running());
        advance(100).await;
        assert_eq!(controller.generation(), 1);

        controller.clear();
        assert_eq!(controller.generation(), 0);
        assert_eq!(controller.snapshot().live_cells(), 0);

        controller.pause();
        controller.randomize();
        assert_eq!(controller.generation(), 0);
        controller.toggle_cell(0, 0).unwrap();
        controller.clear();
        assert_eq!(controller.generation(), 0);
        assert_eq!(controller.snapshot().live_cells(), 0);
    }

    #[tokio::test]
    async fn set_speed_clamps_to_bounds() {
        let mut controller = controller();
        assert_eq!(controller.set_speed(0), 50);
        assert_eq!(controller.speed_millis(), 50);
        assert_eq!(controller.set_speed(10_000), 500);
        assert_eq!(controller.set_speed(250), 250);
        assert_eq!(controller.speed_millis(), 250);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_change_applies_after_pending_tick() {
        let mut controller = controller();
        controller.start();

        advance(50).await;
        controller.set_speed(300);
        advance(100).await;
        assert_eq!(controller.generation(), 1);

        advance(200).await;
        assert_eq!(controller.generation(), 1);
        advance(100).await;
        assert_eq!(controller.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tick_is_ignored() {
        let mut controller = controller();
        controller.randomize();
        controller.start();
        let epoch = controller.shared.lock().epoch;
        controller.pause();

        assert!(!controller.shared.tick(epoch));
        assert_eq!(controller.generation(), 0);

        controller.start();
        assert!(!controller.shared.tick(epoch));
        assert_eq!(controller.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_hears_changes_only() {
        let mut controller = controller();
        let count = counting_listener(&mut controller);

        controller.toggle_cell(1, 1).unwrap();
        controller.set_speed(100);
        controller.pause();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        controller.clear();
        controller.start();
        advance(150).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        controller.toggle_cell(1, 1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_after_drop() {
        let mut controller = controller();
        let count = counting_listener(&mut controller);
        controller.start();
        advance(150).await;
        let heard = count.load(Ordering::SeqCst);
        assert_eq!(heard, 2);

        drop(controller);
        advance(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), heard);
    }
}
