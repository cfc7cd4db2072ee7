mod optimizer;
mod planar;
mod report;
mod reprojection;
mod solver;

pub use optimizer::{
    CalibrationOutcome, CalibrationResult, CalibrationSetup, ObservationSet, PARAMETER_LIMIT,
    calibrate_leave_one_out, select_removal, validate_parameters,
};
pub use planar::PlanarSolver;
pub use report::{CalibrationReport, ReportOptions, ReportSink, calibrate_and_save, unix_time_now};
pub use reprojection::{ReprojectionErrors, reprojection_errors};
pub use solver::{CalibrationSolver, SolverFlags, SolverInput, SolverOutput};
