//! Calibration capture: sample a video, collect observation sets, calibrate once

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::calibration::{
    CalibrationOutcome, CalibrationSolver, ObservationSet, ReportSink, calibrate_and_save,
};
use crate::config::CaptureConfig;
use crate::error::{Result, VxpError};
use crate::pattern::PatternGeometry;
use crate::source::{Frame, FrameSource, PatternDetector, frame_size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    /// Frames are inspected, nothing is collected
    Detection,
    /// Detected observation sets are collected
    Capturing,
    /// Terminal: the pass ended after a calibration was saved
    Calibrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The working collection reached the target size and calibration ran
    TargetReached,
    /// The frame source is exhausted
    StreamEnded { calibrated: bool },
}

/// The capture state machine. Pairs not listed keep their state.
pub fn transition(state: CaptureState, event: CaptureEvent) -> CaptureState {
    match (state, event) {
        (CaptureState::Capturing, CaptureEvent::TargetReached) => CaptureState::Detection,
        (CaptureState::Detection, CaptureEvent::StreamEnded { calibrated: true }) => {
            CaptureState::Calibrated
        }
        (state, _) => state,
    }
}

/// Working state of one capture pass over a calibration video
#[derive(Debug)]
pub struct CaptureSession {
    state: CaptureState,
    geometry: PatternGeometry,
    sample_every: usize,
    target_views: usize,
    observations: Vec<ObservationSet>,
    inspected: usize,
}

impl CaptureSession {
    pub fn new(geometry: PatternGeometry, sample_every: usize, target_views: usize) -> Result<Self> {
        if sample_every == 0 || target_views == 0 {
            return Err(VxpError::InvalidConfig(format!(
                "sample cadence and target count must be positive, got {sample_every} and {target_views}"
            )));
        }
        Ok(Self {
            state: CaptureState::Capturing,
            geometry,
            sample_every,
            target_views,
            observations: Vec::with_capacity(target_views),
            inspected: 0,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn observations(&self) -> &[ObservationSet] {
        &self.observations
    }

    /// Number of frames handed to the detector so far
    pub fn inspected(&self) -> usize {
        self.inspected
    }

    /// Whether frame `frame_index` falls on the inspection cadence
    pub fn inspects(&self, frame_index: usize) -> bool {
        frame_index % self.sample_every == 0
    }

    /// Feed one decoded frame. Returns the full working collection, once,
    /// at the moment it reaches the target size; the session then stops
    /// collecting.
    pub fn push_frame<D: PatternDetector + ?Sized>(
        &mut self,
        frame_index: usize,
        frame: &Frame,
        detector: &mut D,
    ) -> Result<Option<Vec<ObservationSet>>> {
        if !self.inspects(frame_index) {
            return Ok(None);
        }
        self.inspected += 1;

        let found = detector
            .detect(frame_index, frame, &self.geometry)?
            .filter(|points| points.len() == self.geometry.point_count());

        if self.state != CaptureState::Capturing {
            return Ok(None);
        }
        let Some(image_points) = found else {
            debug!("frame {frame_index}: pattern not found");
            return Ok(None);
        };

        self.observations.push(ObservationSet {
            frame_index,
            image_points,
        });
        info!(
            "frame {frame_index}: observation {}/{} collected",
            self.observations.len(),
            self.target_views
        );

        if self.observations.len() >= self.target_views {
            self.state = transition(self.state, CaptureEvent::TargetReached);
            return Ok(Some(std::mem::take(&mut self.observations)));
        }
        Ok(None)
    }

    pub fn end_stream(&mut self, calibrated: bool) -> CaptureState {
        self.state = transition(self.state, CaptureEvent::StreamEnded { calibrated });
        self.state
    }
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub calibration: CalibrationOutcome,
    pub frames_decoded: usize,
    pub frames_inspected: usize,
    pub state: CaptureState,
}

/// Decode `source` to its end, collecting observation sets on the configured
/// cadence and calibrating once the target count is reached.
pub fn run_capture<S, D, V, K>(
    source: &mut S,
    detector: &mut D,
    solver: &V,
    sink: &mut K,
    config: &CaptureConfig,
) -> Result<CaptureOutcome>
where
    S: FrameSource + ?Sized,
    D: PatternDetector + ?Sized,
    V: CalibrationSolver + ?Sized,
    K: ReportSink + ?Sized,
{
    config.validate()?;
    let mut session = CaptureSession::new(config.geometry()?, config.sample_every, config.target_views)?;
    let mut calibration = None;
    let mut frame_index = 0usize;

    while let Some(frame) = source.next_frame()? {
        if let Some(observations) = session.push_frame(frame_index, &frame, detector)? {
            let setup = config.setup(frame_size(&frame))?;
            info!(
                "collected {} observation sets by frame {frame_index}, calibrating",
                observations.len()
            );
            calibration = Some(calibrate_and_save(
                solver,
                &setup,
                config.report_options(),
                observations,
                sink,
            )?);
        }
        frame_index += 1;
    }

    let state = session.end_stream(calibration.is_some());
    let Some(calibration) = calibration else {
        return Err(VxpError::InsufficientData(format!(
            "video ended after {frame_index} frames with {} of {} observation sets",
            session.observations().len(),
            config.target_views
        )));
    };

    Ok(CaptureOutcome {
        calibration,
        frames_decoded: frame_index,
        frames_inspected: session.inspected(),
        state,
    })
}
