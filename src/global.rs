//! Process-wide default connector.
//!
//! This is a convenience layer over explicit injection: [`crate::Client`]s
//! built with the default [`crate::Agent::Global`] consult the connector
//! installed here on every call. Individual calls can still opt out with
//! [`crate::opt_out`].

use crate::connector::{Connector, RemappingConnector};
use crate::mapping::MappingSource;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::info;

#[derive(Default)]
struct GlobalState {
    connector: Option<Arc<dyn Connector>>,
    /// Set when the installed connector is a remapping one, so a later
    /// hijack swaps its mapping instead of replacing it.
    remapping: Option<RemappingConnector>,
}

fn state() -> &'static RwLock<GlobalState> {
    static STATE: OnceLock<RwLock<GlobalState>> = OnceLock::new();
    STATE.get_or_init(|| RwLock::new(GlobalState::default()))
}

/// Routes every default-agent request in the process through a
/// [`RemappingConnector`] using `source`.
///
/// Calling again replaces the mapping; the last call wins.
pub fn hijack_global_agent(source: impl MappingSource + 'static) {
    let mut state = state().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = &state.remapping {
        existing.set_mapping(Some(Arc::new(source)));
        info!("Global agent mapping replaced");
        return;
    }

    let connector = RemappingConnector::with_mapping(source);
    state.connector = Some(Arc::new(connector.clone()));
    state.remapping = Some(connector);
    info!("Global agent hijacked");
}

/// Installs a preconfigured remapping connector (policy, transport) as the
/// global one. Later [`hijack_global_agent`] calls swap its mapping.
pub fn install_global_remapping(connector: RemappingConnector) {
    let mut state = state().write().unwrap_or_else(PoisonError::into_inner);
    state.connector = Some(Arc::new(connector.clone()));
    state.remapping = Some(connector);
    info!(policy = ?state.remapping.as_ref().map(|c| c.policy()), "Global remapping connector installed");
}

/// Installs an arbitrary connector as the global one.
pub fn install_global_connector(connector: Arc<dyn Connector>) {
    let mut state = state().write().unwrap_or_else(PoisonError::into_inner);
    state.connector = Some(connector);
    state.remapping = None;
    info!("Global connector installed");
}

/// Removes any global connector; default-agent requests go out unmodified.
pub fn restore_global_agent() {
    let mut state = state().write().unwrap_or_else(PoisonError::into_inner);
    *state = GlobalState::default();
    info!("Global agent restored");
}

/// The currently installed global connector.
pub fn global_connector() -> Option<Arc<dyn Connector>> {
    state()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .connector
        .clone()
}

/// The installed remapping connector, if the global one is a remapping one.
pub fn global_remapping() -> Option<RemappingConnector> {
    state()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .remapping
        .clone()
}
