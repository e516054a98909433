//! Bounded concurrent execution of per-unit operations.

use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use glob::Pattern;
use log::{error, warn};
use rsrcore::aggregate::Aggregator;
use rsrcore::prelude::{ProcessingStage, SkipReason, StageOutcome, StageResult, Unit};
use rsrcore::processing::run_stage;
use rsrcore::products::{Catalog, Product, ProductLocator};
use rsrcore::telemetry::{MetricsRecorder, MetricsSnapshot, Timed};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Picks are listed from another processing directory and radar product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickSource {
    pub process: String,
    pub product: String,
}

/// Which (track, pick) units an invocation covers.
#[derive(Debug, Clone)]
pub struct UnitSelector {
    /// Shell glob over track keys.
    pub tracks: String,
    /// Shell glob over pick names.
    pub picks: String,
    pub source: Option<PickSource>,
}

impl UnitSelector {
    pub fn new(tracks: impl Into<String>, picks: impl Into<String>) -> Self {
        Self {
            tracks: tracks.into(),
            picks: picks.into(),
            source: None,
        }
    }

    pub fn from_source(mut self, source: PickSource) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Debug)]
pub enum RunResult<T> {
    Done(T),
    Failed(String),
    TimedOut,
}

#[derive(Debug)]
pub struct UnitRun<T> {
    pub unit: Unit,
    pub result: RunResult<T>,
}

/// One line of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub unit: String,
    pub status: &'static str,
    pub detail: Option<String>,
}

impl From<&UnitRun<StageOutcome>> for ReportEntry {
    fn from(run: &UnitRun<StageOutcome>) -> Self {
        let (status, detail) = match &run.result {
            RunResult::Done(StageOutcome::Completed { product, .. }) => {
                ("completed", Some(product.display().to_string()))
            }
            RunResult::Done(StageOutcome::Skipped(reason)) => ("skipped", Some(reason.to_string())),
            RunResult::Failed(message) => ("failed", Some(message.clone())),
            RunResult::TimedOut => ("timed_out", None),
        };
        Self {
            unit: run.unit.to_string(),
            status,
            detail,
        }
    }
}

pub struct Driver {
    season: String,
    catalog: Catalog,
    locator: ProductLocator,
    workers: usize,
    timeout: Option<Duration>,
    metrics: MetricsRecorder,
}

impl Driver {
    pub fn new(config: &WorkflowConfig) -> anyhow::Result<Self> {
        Ok(Self::from_parts(
            config.season.clone(),
            config.catalog()?,
            config.locator(),
            config.execution.worker_count(),
            config.execution.unit_timeout(),
        ))
    }

    pub fn from_parts(
        season: String,
        catalog: Catalog,
        locator: ProductLocator,
        workers: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            season,
            catalog,
            locator,
            workers: workers.max(1),
            timeout,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn locator(&self) -> &ProductLocator {
        &self.locator
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Units of the selection: tracks in catalog order, picks in sorted order.
    pub fn units(&self, selector: &UnitSelector) -> anyhow::Result<Vec<Unit>> {
        let tracks = self
            .catalog
            .tracks(&self.season, &selector.tracks)
            .with_context(|| format!("selecting tracks {}", selector.tracks))?;
        let pick_pattern = Pattern::new(&selector.picks)
            .with_context(|| format!("invalid pick pattern {}", selector.picks))?;

        let mut units = Vec::new();
        for track in tracks {
            let picks = match &selector.source {
                Some(source) => self.locator.picks_in(&source.process, &source.product, &track),
                None => self.locator.picks(&track),
            }
            .with_context(|| format!("listing picks of {}", track))?;
            units.extend(
                picks
                    .into_iter()
                    .filter(|pick| pick_pattern.matches(pick))
                    .map(|pick| Unit::new(track.clone(), pick)),
            );
        }
        Ok(units)
    }

    /// Runs `stage` over `units` and counts the outcomes.
    pub fn run_stage(
        &self,
        stage: Arc<dyn ProcessingStage>,
        units: Vec<Unit>,
    ) -> anyhow::Result<Vec<UnitRun<StageOutcome>>> {
        let locator = self.locator.clone();
        let label = stage.name();
        let runs = self.for_each_unit(label, units, move |unit| {
            run_stage(stage.as_ref(), &locator, unit)
        })?;
        self.count(label, &runs);
        Ok(runs)
    }

    /// Collects rows of `units` on the pool and appends them in unit order.
    ///
    /// A unit without a statistics record is skipped; a failed append fails
    /// only that unit.
    pub fn gather(
        &self,
        aggregator: Arc<Aggregator>,
        units: Vec<Unit>,
    ) -> anyhow::Result<Vec<UnitRun<StageOutcome>>> {
        let producer = aggregator.clone();
        let collected = self.for_each_unit("gather", units, move |unit| producer.rows(unit))?;

        let runs: Vec<UnitRun<StageOutcome>> = collected
            .into_iter()
            .map(|run| {
                let result = match run.result {
                    RunResult::Done(Some(rows)) => match aggregator.append(&rows) {
                        Ok(written) => RunResult::Done(StageOutcome::Completed {
                            product: aggregator.output().to_path_buf(),
                            rows: written,
                        }),
                        Err(err) => RunResult::Failed(err.to_string()),
                    },
                    RunResult::Done(None) => RunResult::Done(StageOutcome::Skipped(
                        SkipReason::MissingInput(self.locator.path(&Product::Statistics, &run.unit)),
                    )),
                    RunResult::Failed(message) => RunResult::Failed(message),
                    RunResult::TimedOut => RunResult::TimedOut,
                };
                UnitRun {
                    unit: run.unit,
                    result,
                }
            })
            .collect();
        self.count("gather", &runs);
        Ok(runs)
    }

    fn count(&self, label: &str, runs: &[UnitRun<StageOutcome>]) {
        for run in runs {
            match &run.result {
                RunResult::Done(outcome) if outcome.is_completed() => self.metrics.record_completed(),
                RunResult::Done(_) => self.metrics.record_skipped(),
                RunResult::Failed(message) => {
                    error!("{} {} failed: {}", label, run.unit, message);
                    self.metrics.record_failed();
                }
                RunResult::TimedOut => {
                    warn!("{} {} timed out", label, run.unit);
                    self.metrics.record_timed_out();
                }
            }
        }
    }

    /// Applies `operation` to every unit on a bounded pool of blocking workers.
    ///
    /// Results come back in the order of `units`. A unit that errors, panics
    /// or runs past the timeout is reported as such without stopping the others.
    pub fn for_each_unit<T, F>(
        &self,
        label: &'static str,
        units: Vec<Unit>,
        operation: F,
    ) -> anyhow::Result<Vec<UnitRun<T>>>
    where
        T: Send + 'static,
        F: Fn(&Unit) -> StageResult<T> + Send + Sync + 'static,
    {
        let runtime = TokioBuilder::new_multi_thread()
            .worker_threads(self.workers)
            .enable_time()
            .build()
            .context("creating worker runtime")?;

        let operation = Arc::new(Timed::new(label, operation));
        let permits = Arc::new(Semaphore::new(self.workers));
        let timeout = self.timeout;

        let runs = runtime.block_on(async move {
            let mut tasks = Vec::with_capacity(units.len());
            for unit in units {
                let operation = operation.clone();
                let permits = permits.clone();
                let task_unit = unit.clone();
                let task = tokio::spawn(async move {
                    let Ok(permit) = permits.acquire_owned().await else {
                        return RunResult::Failed("worker pool closed".into());
                    };
                    // the permit is released when the computation returns, not on timeout
                    let work = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        operation.run(&task_unit)
                    });
                    match timeout {
                        Some(limit) => match tokio::time::timeout(limit, work).await {
                            Ok(joined) => settle(joined),
                            Err(_) => RunResult::TimedOut,
                        },
                        None => settle(work.await),
                    }
                });
                tasks.push((unit, task));
            }

            let mut runs = Vec::with_capacity(tasks.len());
            for (unit, task) in tasks {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => RunResult::Failed(join_failure(&err)),
                };
                runs.push(UnitRun { unit, result });
            }
            runs
        });
        Ok(runs)
    }
}

fn settle<T>(joined: Result<StageResult<T>, JoinError>) -> RunResult<T> {
    match joined {
        Ok(Ok(value)) => RunResult::Done(value),
        Ok(Err(err)) => RunResult::Failed(err.to_string()),
        Err(err) => RunResult::Failed(join_failure(&err)),
    }
}

fn join_failure(err: &JoinError) -> String {
    if err.is_panic() {
        "worker panicked".to_string()
    } else {
        format!("worker cancelled: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsrcore::prelude::StageError;
    use rsrcore::products::{CatalogEntry, ProductPaths, Track};
    use std::fs;
    use tempfile::TempDir;

    fn driver(root: &std::path::Path, workers: usize, timeout: Option<Duration>) -> Driver {
        let catalog = Catalog::from_entries(
            ["MIS/JKB2e/Y35a", "MIS/JKB2e/Y36a", "DVD/JKB2h/X10a"]
                .into_iter()
                .map(|track| CatalogEntry {
                    track: Track::new(track),
                    flight: "F10".into(),
                    season: "ICP5".into(),
                })
                .collect(),
        );
        let locator = ProductLocator::new(ProductPaths::under(root), "pik1.1m", "MagHiResInco1");
        Driver::from_parts("ICP5".into(), catalog, locator, workers, timeout)
    }

    #[test]
    fn units_follow_catalog_then_pick_order() {
        let temp = TempDir::new().unwrap();
        let driver = driver(temp.path(), 2, None);
        for (track, pick) in [
            ("MIS/JKB2e/Y36a", "srf_elg"),
            ("MIS/JKB2e/Y35a", "srf_elg"),
            ("MIS/JKB2e/Y35a", "bed_elg"),
            ("DVD/JKB2h/X10a", "srf_elg"),
        ] {
            let dir = driver.locator().pick_dir("pik1.1m", &Track::new(track));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("MagHiResInco1.{pick}")), "").unwrap();
        }

        let units = driver.units(&UnitSelector::new("MIS/*", "*")).unwrap();
        let names: Vec<String> = units.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "MIS/JKB2e/Y35a [bed_elg]",
                "MIS/JKB2e/Y35a [srf_elg]",
                "MIS/JKB2e/Y36a [srf_elg]",
            ]
        );
        assert_eq!(driver.units(&UnitSelector::new("*", "bed*")).unwrap().len(), 1);
    }

    #[test]
    fn failing_units_do_not_stop_the_batch() {
        let temp = TempDir::new().unwrap();
        let driver = driver(temp.path(), 3, None);
        let units: Vec<Unit> = (0..8).map(|i| Unit::new("A/B/C", format!("p{i}"))).collect();

        let runs = driver
            .for_each_unit("check", units, |unit| match unit.pick.as_str() {
                "p2" => Err(StageError::InvalidInput("bad pick".into())),
                "p5" => panic!("boom"),
                pick => Ok(pick.len()),
            })
            .unwrap();

        assert_eq!(runs.len(), 8);
        assert_eq!(runs[3].unit.pick, "p3");
        assert!(matches!(runs[0].result, RunResult::Done(2)));
        assert!(matches!(&runs[2].result, RunResult::Failed(msg) if msg.contains("bad pick")));
        assert!(matches!(&runs[5].result, RunResult::Failed(msg) if msg.contains("panicked")));
        assert!(matches!(runs[7].result, RunResult::Done(2)));
    }

    #[test]
    fn slow_unit_times_out() {
        let temp = TempDir::new().unwrap();
        let driver = driver(temp.path(), 2, Some(Duration::from_millis(100)));
        let units = vec![Unit::new("A/B/C", "fast"), Unit::new("A/B/C", "slow")];

        let runs = driver
            .for_each_unit("check", units, |unit| {
                if unit.pick == "slow" {
                    std::thread::sleep(Duration::from_millis(1500));
                }
                Ok(())
            })
            .unwrap();

        assert!(matches!(runs[0].result, RunResult::Done(())));
        assert!(matches!(runs[1].result, RunResult::TimedOut));
    }

    #[test]
    fn stage_runs_are_counted() {
        let temp = TempDir::new().unwrap();
        let driver = driver(temp.path(), 2, None);
        let context = Arc::new(rsrcore::processing::StageContext::new(
            Default::default(),
            driver.locator().clone(),
        ));
        let stage = rsrcore::processing::StageKind::SurfaceCoefficients
            .build(context, None)
            .unwrap();

        let runs = driver
            .run_stage(Arc::from(stage), vec![Unit::new("A/B/C", "srf_elg")])
            .unwrap();
        assert!(matches!(runs[0].result, RunResult::Done(StageOutcome::Skipped(_))));
        assert_eq!(driver.metrics().skipped, 1);
        assert_eq!(ReportEntry::from(&runs[0]).status, "skipped");
    }

    #[test]
    fn gather_appends_in_unit_order_and_counts_outcomes() {
        use rsrcore::products::records::write_statistics;
        use rsrcore::products::WindowStatistics;

        let temp = TempDir::new().unwrap();
        let driver = driver(temp.path(), 2, None);
        let window = WindowStatistics {
            start: 0.0,
            center: 20.0,
            end: 40.0,
            total_power: -10.0,
            coherent_power: -11.0,
            diffuse_power: -20.0,
            mixture: 5.0,
            coherence: 0.9,
            goodness: 0.01,
            flag: 1.0,
        };
        let present = Unit::new("MIS/JKB2e/Y35a", "srf_elg");
        write_statistics(driver.locator(), &present, &[window, window]).unwrap();
        let absent = Unit::new("MIS/JKB2e/Y36a", "srf_elg");

        let output = temp.path().join("ICP5_gather.csv");
        let aggregator = Arc::new(Aggregator::new(driver.locator().clone(), output.clone()));
        let runs = driver.gather(aggregator, vec![present, absent]).unwrap();

        assert!(matches!(
            runs[0].result,
            RunResult::Done(StageOutcome::Completed { rows: 2, .. })
        ));
        assert!(matches!(
            runs[1].result,
            RunResult::Done(StageOutcome::Skipped(SkipReason::MissingInput(_)))
        ));
        let metrics = driver.metrics();
        assert_eq!((metrics.completed, metrics.skipped), (1, 1));
        assert_eq!(fs::read_to_string(&output).unwrap().lines().count(), 3);
    }
}
