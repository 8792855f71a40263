pub mod bluetooth;
pub mod logging;
pub mod workout_log;
