//! Background optimization of a shared site.
//!
//! `start()` clones the live site into a private snapshot and optimizes the
//! snapshot on a worker thread. The live site only ever receives complete
//! accepted parameter vectors: on a fixed cadence while the run is going and
//! once more when it ends.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, tick, unbounded};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::optimizer::{self, OptimizeError, OptimizeReport, OptimizerConfig, Progress};
use crate::site::Site;

use super::shared_state::{RunFlags, SharedSite};

type RunResult = Result<OptimizeReport, OptimizeError>;

/// Controls at most one background optimization of a shared site.
pub struct OptimizerHandle {
    site: SharedSite,
    config: OptimizerConfig,
    flags: Arc<RunFlags>,

    /// Worker of the current or last run.
    worker: Mutex<Option<JoinHandle<RunResult>>>,

    /// Reports of finished runs (worker -> handle).
    result_sender: Sender<OptimizeReport>,
    result_receiver: Receiver<OptimizeReport>,
}

impl OptimizerHandle {
    pub fn new(site: SharedSite, config: OptimizerConfig) -> Self {
        let (result_sender, result_receiver) = unbounded();
        Self {
            site,
            config,
            flags: RunFlags::new(),
            worker: Mutex::new(None),
            result_sender,
            result_receiver,
        }
    }

    pub fn site(&self) -> &SharedSite {
        &self.site
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Start optimizing in the background.
    ///
    /// Returns `Ok(false)` without doing anything if a run is in progress.
    /// Configuration errors are returned here, before any thread is spawned.
    pub fn start(&self) -> Result<bool, OptimizeError> {
        // Held until the worker is spawned, so a concurrent stop() lands
        // either before the flag reset or on the new run.
        let mut worker = self.worker.lock();
        if !self.flags.try_begin() {
            debug!("Optimizer already running, start ignored");
            return Ok(false);
        }

        let snapshot = {
            let live = self.site.read();
            if let Err(err) = optimizer::validate(&live) {
                self.flags.finish();
                warn!("Optimizer not started: {}", err);
                return Err(err);
            }
            live.clone()
        };
        self.flags.clear_stop();

        if let Some(previous) = worker.take()
            && previous.join().is_err()
        {
            warn!("Previous optimizer worker panicked");
        }

        let site = Arc::clone(&self.site);
        let config = self.config.clone();
        let flags = Arc::clone(&self.flags);
        let results = self.result_sender.clone();
        *worker = Some(thread::spawn(move || run_worker(site, snapshot, config, flags, results)));

        info!("Optimizer started");
        Ok(true)
    }

    /// Ask the running optimization to stop. It ends before its next
    /// objective evaluation and still syncs its best result.
    pub fn stop(&self) {
        let _worker = self.worker.lock();
        self.flags.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.flags.is_running()
    }

    /// Block until the current run ends and return its result.
    ///
    /// Returns `None` if no run was started since the last `wait()` or the
    /// worker panicked.
    pub fn wait(&self) -> Option<RunResult> {
        let handle = self.worker.lock().take()?;
        match handle.join() {
            Ok(result) => Some(result),
            Err(_) => {
                warn!("Optimizer worker panicked");
                None
            }
        }
    }

    /// Report of a finished run, if one arrived since the last call.
    pub fn try_result(&self) -> Option<OptimizeReport> {
        self.result_receiver.try_recv().ok()
    }
}

impl Drop for OptimizerHandle {
    fn drop(&mut self) {
        self.flags.request_stop();
        if let Some(handle) = self.worker.get_mut().take() {
            let _ = handle.join();
        }
    }
}

/// Clears the running flag even if the worker unwinds.
struct RunningGuard(Arc<RunFlags>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn run_worker(
    live: SharedSite,
    mut snapshot: Site,
    config: OptimizerConfig,
    flags: Arc<RunFlags>,
    results: Sender<OptimizeReport>,
) -> RunResult {
    let _running = RunningGuard(Arc::clone(&flags));
    let ticker = tick(config.sync_interval);

    let should_stop = || flags.should_stop();
    let mut on_progress = |progress: &Progress<'_>| {
        if ticker.try_recv().is_ok() {
            let applied = sync_progress(&live, progress);
            debug!(
                "Synced iteration {} (objective {:.6e}, {} values)",
                progress.iteration, progress.objective, applied
            );
        }
    };

    let result = optimizer::optimize(&mut snapshot, &config, &should_stop, &mut on_progress);

    match &result {
        Ok(report) => {
            let (params, _) = snapshot.flatten_parameters();
            let values = snapshot.parameter_values(&params);
            {
                let mut site = live.write();
                site.apply_parameter_values(&params, &values);
                site.evaluate_objective();
            }
            info!("Optimizer finished: {}", report);
            if results.send(report.clone()).is_err() {
                debug!("Result receiver dropped");
            }
        }
        Err(err) => warn!("Optimization failed: {}", err),
    }

    result
}

/// Write an accepted parameter vector into the live site and refresh its
/// residual caches so readers see a consistent objective.
fn sync_progress(live: &SharedSite, progress: &Progress<'_>) -> usize {
    let mut site = live.write();
    let applied = site.apply_parameter_values(progress.parameters, progress.values);
    site.evaluate_objective();
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::Termination;
    use crate::params::Position;
    use crate::site::{PointId, Rangefinder, RangefinderMeasurement};
    use crate::system::shared_site;
    use approx::assert_relative_eq;
    use std::time::Duration;

    /// One free point that should end up 5 m from the fixed one.
    fn site() -> (Site, PointId) {
        let mut site = Site::new("handle");
        let a = site.add_point("a", Position::fixed(0.0, 0.0, 0.0));
        let b = site.add_point("b", Position::new(1.0, 1.0, 1.0));
        let rf = site.add_rangefinder(Rangefinder::new("laser"));
        site.add_rangefinder_measurement(rf, RangefinderMeasurement::new(a, b, 5.0))
            .unwrap();
        (site, b)
    }

    fn eager_config() -> OptimizerConfig {
        OptimizerConfig {
            sync_interval: Duration::ZERO,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn test_run_updates_live_site() {
        let (site, b) = site();
        let shared = shared_site(site);
        let handle = OptimizerHandle::new(Arc::clone(&shared), OptimizerConfig::default());

        assert_eq!(handle.start(), Ok(true));
        let report = handle.wait().unwrap().unwrap();
        assert!(!handle.is_running());
        assert!(report.final_objective < 1e-10, "{report}");

        let live = shared.read();
        assert_relative_eq!(live.get_point(b).unwrap().position.vector().norm(), 5.0, epsilon = 1e-6);
        assert_relative_eq!(live.objective(), report.final_objective, epsilon = 1e-9);
        drop(live);

        assert_eq!(handle.try_result(), Some(report));
        assert_eq!(handle.try_result(), None);
    }

    #[test]
    fn test_second_start_is_ignored() {
        let (site, _) = site();
        let shared = shared_site(site);
        let handle = OptimizerHandle::new(Arc::clone(&shared), eager_config());

        // Holding a read guard keeps the worker from syncing, so it cannot
        // finish while we look.
        let guard = shared.read();
        assert_eq!(handle.start(), Ok(true));
        assert!(handle.is_running());
        assert_eq!(handle.start(), Ok(false));
        drop(guard);

        assert!(handle.wait().unwrap().is_ok());
        assert!(!handle.is_running());
        assert!(handle.wait().is_none());
    }

    #[test]
    fn test_stop_ends_run() {
        let (site, b) = site();
        let shared = shared_site(site);
        let handle = OptimizerHandle::new(Arc::clone(&shared), eager_config());

        let guard = shared.read();
        assert_eq!(handle.start(), Ok(true));
        handle.stop();
        drop(guard);

        let report = handle.wait().unwrap().unwrap();
        assert_eq!(report.termination, Termination::Stopped);
        assert!(!handle.is_running());

        // Whatever was accepted before the stop reached the live site.
        let live = shared.read();
        assert_relative_eq!(live.objective(), report.final_objective, epsilon = 1e-9);
        assert!(live.get_point(b).is_some());
    }

    #[test]
    fn test_configuration_error_is_synchronous() {
        let mut site = Site::new("empty");
        site.add_point("fixed", Position::fixed(0.0, 0.0, 0.0));
        let handle = OptimizerHandle::new(shared_site(site), OptimizerConfig::default());

        assert_eq!(handle.start(), Err(OptimizeError::NoParameters));
        assert!(!handle.is_running());
        assert!(handle.wait().is_none());
    }

    #[test]
    fn test_stop_before_start_is_ignored() {
        let (site, b) = site();
        let shared = shared_site(site);
        let handle = OptimizerHandle::new(Arc::clone(&shared), OptimizerConfig::default());

        handle.stop();
        assert_eq!(handle.start(), Ok(true));
        let report = handle.wait().unwrap().unwrap();
        assert_ne!(report.termination, Termination::Stopped);
        assert!(report.final_objective < 1e-10, "{report}");
        assert_relative_eq!(shared.read().get_point(b).unwrap().position.vector().norm(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sync_refreshes_residual_caches() {
        let (mut solved, b) = site();
        solved.get_point_mut(b).unwrap().position = Position::new(3.0, 4.0, 0.0);
        let (parameters, _) = solved.flatten_parameters();
        let values = solved.parameter_values(&parameters);

        let shared = shared_site(site().0);
        assert!(shared.write().evaluate_objective() > 1.0);

        let progress = Progress {
            iteration: 1,
            objective: 0.0,
            parameters: &parameters,
            values: &values,
        };
        assert_eq!(sync_progress(&shared, &progress), 3);

        let live = shared.read();
        assert_relative_eq!(live.objective(), 0.0, epsilon = 1e-12);
        for rangefinder in live.rangefinders().values() {
            for measurement in rangefinder.measurements.values() {
                assert_relative_eq!(measurement.last_residual_sqr, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_restart_after_finish() {
        let (site, _) = site();
        let handle = OptimizerHandle::new(shared_site(site), OptimizerConfig::default());

        assert_eq!(handle.start(), Ok(true));
        handle.wait();
        assert_eq!(handle.start(), Ok(true));
        let report = handle.wait().unwrap().unwrap();
        // Already solved by the first run.
        assert!(report.initial_objective < 1e-10);
    }
}
