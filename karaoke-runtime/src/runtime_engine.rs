use std::sync::Arc;

use karaoke_core::config::AppConfig;
use karaoke_core::types::Mode;
use karaoke_engine::traits::{MediaTransport, Microphone, SessionObserver};
use karaoke_engine::{Collaborators, ControllerConfig, SessionController};

use crate::backend::HttpBackend;

/// Host-side pieces the backend cannot provide.
#[derive(Clone)]
pub struct HostBindings {
    pub microphone: Arc<dyn Microphone>,
    pub transport: Arc<dyn MediaTransport>,
    pub observer: Option<Arc<dyn SessionObserver>>,
}

/// Build a session controller from config + host bindings.
///
/// Song resolution, scoring and the leaderboard all go to the configured backend.
pub fn build_controller_from_config(
    cfg: &AppConfig,
    mode: Mode,
    host: HostBindings,
) -> SessionController {
    let backend = Arc::new(HttpBackend::new(cfg.backend_base_url.clone()));
    log::info!(
        "building {} session against {}",
        mode.as_str(),
        backend.base_url()
    );

    let deps = Collaborators {
        microphone: host.microphone,
        transport: host.transport,
        resolver: backend.clone(),
        scorer: backend.clone(),
        leaderboard: backend,
        observer: host.observer,
    };

    SessionController::create(ControllerConfig::from_app_config(cfg, mode), deps)
}
