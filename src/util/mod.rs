pub mod clock;
pub mod signal;
pub mod telemetry;

pub use clock::*;
pub use signal::*;
pub use telemetry::*;
