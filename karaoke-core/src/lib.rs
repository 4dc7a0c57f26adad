pub mod calibration;
pub mod config;
pub mod cursor;
pub mod score;
pub mod types;

// Keep the public surface small and intentional.
pub use calibration::*;
pub use config::*;
pub use cursor::*;
pub use score::*;
pub use types::*;
