pub mod battle;
pub mod capture;
pub mod controller;
pub mod session;
pub mod submission;
pub mod traits;

pub use controller::{Collaborators, ControllerConfig, SessionController, SessionError};
