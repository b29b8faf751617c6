pub mod avr;
pub mod bridge;
pub mod cec;
pub mod config;
pub mod power;

pub use bridge::Bridge;
pub use config::Config;
pub use power::{Coordinator, DisplayPowerState, PowerOffOutcome, PowerOnOutcome};
