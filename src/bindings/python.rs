use crate::config::{load_config, Config, DetectorConfig};
use crate::error::MonitorError;
use crate::processing::pipeline::Pipeline;
use crate::processing::scheduler::SchedulerHandle;
use crate::processing::source::SyntheticSource;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(error: MonitorError) -> PyErr {
    match error {
        MonitorError::Io(_) | MonitorError::ProductionStepFailure(_) => {
            PyRuntimeError::new_err(error.to_string())
        }
        _ => PyValueError::new_err(error.to_string()),
    }
}

/// (frame_index, timestamp, value, peak label or None)
type PySample = (u64, f64, f64, Option<u8>);

#[pyclass]
pub struct PyPipeline {
    pipeline: Pipeline,
    scheduler: Option<SchedulerHandle>,
}

#[pymethods]
impl PyPipeline {
    #[new]
    #[pyo3(signature = (config_path=None))]
    pub fn new(config_path: Option<String>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => load_config(path).map_err(to_py_err)?,
            None => Config::default(),
        };
        let source = SyntheticSource::new(config.source.clone(), config.processor.seed);
        let pipeline = Pipeline::new(config).map_err(to_py_err)?;
        let scheduler = pipeline
            .spawn_scheduler(Box::new(source))
            .map_err(to_py_err)?;
        Ok(PyPipeline {
            pipeline,
            scheduler: Some(scheduler),
        })
    }

    pub fn start(&self) -> PyResult<String> {
        self.pipeline.start().map_err(to_py_err)?;
        Ok(self.pipeline.state().to_string())
    }

    pub fn stop(&self) -> PyResult<String> {
        self.pipeline.stop().map_err(to_py_err)?;
        Ok(self.pipeline.state().to_string())
    }

    pub fn pause(&self) -> PyResult<String> {
        self.pipeline.pause().map_err(to_py_err)?;
        Ok(self.pipeline.state().to_string())
    }

    pub fn resume(&self) -> PyResult<String> {
        self.pipeline.resume().map_err(to_py_err)?;
        Ok(self.pipeline.state().to_string())
    }

    pub fn state(&self) -> String {
        self.pipeline.state().to_string()
    }

    /// Returns (samples, baseline, last peak label, total frame count).
    pub fn query(&self, count: usize) -> PyResult<(Vec<PySample>, Option<f64>, Option<u8>, u64)> {
        let snapshot = self.pipeline.query(count).map_err(to_py_err)?;
        let samples = snapshot
            .samples
            .iter()
            .map(|s| (s.frame_index, s.timestamp, s.value, s.peak.map(|p| p.label())))
            .collect();
        Ok((
            samples,
            snapshot.baseline,
            snapshot.last_peak.map(|p| p.label()),
            snapshot.total_frame_count,
        ))
    }

    /// Status as a JSON string.
    pub fn status(&self) -> PyResult<String> {
        serde_json::to_string(&self.pipeline.status()).map_err(|e| to_py_err(e.into()))
    }

    pub fn set_tick_rate(&self, hz: u32) -> PyResult<()> {
        self.pipeline.set_tick_rate(hz).map_err(to_py_err)
    }

    /// Detector settings as a JSON string.
    pub fn detector_config(&self) -> PyResult<String> {
        serde_json::to_string(&self.pipeline.detector_config()).map_err(|e| to_py_err(e.into()))
    }

    /// Replaces the detector settings; fields missing from `json` take their defaults.
    pub fn set_detector_config(&self, json: &str) -> PyResult<()> {
        let detector: DetectorConfig =
            serde_json::from_str(json).map_err(|e| to_py_err(e.into()))?;
        self.pipeline.set_detector_config(detector).map_err(to_py_err)
    }

    pub fn reset(&self) {
        self.pipeline.reset();
    }

    /// Stops the producer thread; the object is unusable for production afterwards.
    pub fn close(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.shutdown();
        }
    }
}

/// A Python module implemented in Rust.
#[pymodule]
pub fn peak_monitor(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyPipeline>()?;
    Ok(())
}
