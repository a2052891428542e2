//! ---
//! rovlink_section: "04-link-supervision"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Link status indicator fed by the supervisor's watch channel."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use tokio::sync::watch;
use tracing::{info, warn};

use crate::supervisor::LinkState;

/// Follow link state changes until the supervisor goes away, returning the transitions seen.
pub async fn report_link_status(mut state: watch::Receiver<LinkState>) -> u64 {
    let mut transitions = 0;
    while state.changed().await.is_ok() {
        transitions += 1;
        let current = *state.borrow_and_update();
        match current {
            LinkState::Connected => info!(indicator = "steady", "status: link connected"),
            LinkState::Connecting => info!(indicator = "blink-1hz", "status: searching for network"),
            LinkState::Disconnected => warn!(indicator = "off", "status: link down"),
        }
    }
    transitions
}
