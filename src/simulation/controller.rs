//! Timer-driven driver for a [`Simulation`].
//!
//! One background thread fires ticks at a fixed period. The session sits
//! behind a mutex, so a tick triggered manually and a tick fired by the timer
//! never overlap. Stopping lets the in-flight tick finish before returning.

use super::{Simulation, SimulationError, TickReport};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Tick cadence of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Normal,
    Hyperspeed,
}

pub struct Controller {
    session: Arc<Mutex<Simulation>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            session: Arc::new(Mutex::new(simulation)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn lock(session: &Mutex<Simulation>) -> MutexGuard<'_, Simulation> {
        // A panicking tick leaves the session usable; its state is still consistent per tick.
        session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn period(&self, speed: Speed) -> Duration {
        let session = Self::lock(&self.session);
        let config = &session.config().simulation;
        Duration::from_millis(match speed {
            Speed::Normal => config.tick_period_ms,
            Speed::Hyperspeed => config.hyperspeed_period_ms,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the timer. Returns false if it is already running.
    pub fn start(&mut self, speed: Speed) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Reap a worker that stopped itself after a failed tick.
        if let Some(worker) = self.worker.take() {
            join_worker(worker);
        }

        let period = self.period(speed);
        let session = Arc::clone(&self.session);
        let running = Arc::clone(&self.running);
        info!("Starting simulation timer ({:?}, period {:?})", speed, period);

        self.worker = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                let result = Self::lock(&session).tick();
                if let Err(e) = result {
                    error!("Tick failed, stopping timer: {}", e);
                    running.store(false, Ordering::SeqCst);
                    break;
                }
                let next_tick = started + period;
                while running.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now >= next_tick {
                        break;
                    }
                    thread::park_timeout(next_tick - now);
                }
            }
        }));
        true
    }

    /// Clears the timer and waits for any in-flight tick to complete.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            join_worker(worker);
            info!("Simulation timer stopped");
        }
    }

    /// Runs a single tick on the caller's thread.
    pub fn tick_once(&self) -> Result<TickReport, SimulationError> {
        Self::lock(&self.session).tick()
    }

    /// Gives exclusive access to the session between ticks.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Simulation) -> T) -> T {
        f(&mut Self::lock(&self.session))
    }
}

/// Waits for a timer thread, logging it if it died by panicking.
fn join_worker(worker: JoinHandle<()>) -> bool {
    let clean = worker.join().is_ok();
    if !clean {
        error!("Simulation timer thread panicked");
    }
    clean
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn controller() -> Controller {
        let mut config = Config::default();
        config.evolution.population_size = 4;
        config.evolution.elite_count = 1;
        config.evolution.generation_ticks = 3;
        config.simulation.hyperspeed_period_ms = 1;
        config.simulation.seed = Some(3);
        Controller::new(Simulation::new(config).unwrap())
    }

    #[test]
    fn test_join_worker_reports_panicked_thread() {
        assert!(join_worker(thread::spawn(|| {})));
        assert!(!join_worker(thread::spawn(|| panic!("tick blew up"))));
    }

    #[test]
    fn test_periods_follow_config() {
        let controller = controller();
        assert_eq!(controller.period(Speed::Normal), Duration::from_millis(1000));
        assert_eq!(controller.period(Speed::Hyperspeed), Duration::from_millis(1));
    }

    #[test]
    fn test_manual_ticks() {
        let controller = controller();
        controller.tick_once().unwrap();
        controller.tick_once().unwrap();
        assert_eq!(controller.with_session(|s| s.tick_count()), 2);
    }

    #[test]
    fn test_start_and_stop_timer() {
        let mut controller = controller();
        assert!(controller.start(Speed::Hyperspeed));
        assert!(!controller.start(Speed::Hyperspeed));
        assert!(controller.is_running());

        let deadline = Instant::now() + Duration::from_secs(10);
        while controller.with_session(|s| s.tick_count()) < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        controller.stop();
        assert!(!controller.is_running());

        let ticks = controller.with_session(|s| s.tick_count());
        assert!(ticks >= 5);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(controller.with_session(|s| s.tick_count()), ticks);
    }

    #[test]
    fn test_stop_interrupts_long_period() {
        let mut controller = controller();
        assert!(controller.start(Speed::Normal));
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        controller.stop();
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(controller.with_session(|s| s.tick_count()), 1);
    }
}
