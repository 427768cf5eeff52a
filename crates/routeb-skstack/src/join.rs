//! Network join state machine.
//!
//! [`transition`] is the whole table: every (status, event) pair has an
//! answer, and pairs the table does not name leave the status alone.
//! [`permits`] decides which operations may run from a status.
//!
//! The reply handlers here are the per-step waits used by
//! [`RouteBSession`](crate::session::RouteBSession).

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use tracing::{debug, trace};

use routeb_core::error::{Error, Result};
use routeb_core::types::JoinStatus;

use crate::commands::{self, ScannedPan};
use crate::engine::Wait;
use crate::reply::{Event, Reply, event};

/// Something that happened during the join sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinEvent {
    Reset,
    Authenticated,
    Scanned,
    Registered,
    AssociationStarted,
    AssociationSucceeded,
    AssociationRejected,
    StepFailed,
}

/// A session operation, for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Authenticate,
    Scan,
    ResolveAddress,
    Configure,
    StartAssociation,
    AwaitAssociation,
    QueryPower,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Authenticate => "authenticate",
            Step::Scan => "scan",
            Step::ResolveAddress => "resolve_link_local_address",
            Step::Configure => "register configuration",
            Step::StartAssociation => "start_association",
            Step::AwaitAssociation => "await_association_result",
            Step::QueryPower => "get_instant_power",
        }
    }
}

/// Next status after `event`.
pub fn transition(status: JoinStatus, event: JoinEvent) -> JoinStatus {
    use JoinEvent as E;
    use JoinStatus as S;

    match (status, event) {
        (_, E::Reset) => S::Disconnected,
        (_, E::StepFailed) => S::Failed,
        (S::Disconnected, E::Authenticated) => S::Authenticated,
        (S::Authenticated | S::Scanned, E::Scanned) => S::Scanned,
        (S::Authenticated | S::Scanned | S::Registering, E::Registered) => S::Registering,
        (S::Registering, E::AssociationStarted) => S::Joining,
        (S::Joining, E::AssociationSucceeded) => S::Joined,
        (S::Joining, E::AssociationRejected) => S::Failed,
        (status, _) => status,
    }
}

/// Whether `step` may run while in `status`.
pub fn permits(status: JoinStatus, step: Step) -> bool {
    use JoinStatus as S;

    match step {
        Step::Authenticate => status == S::Disconnected,
        Step::Scan => matches!(status, S::Authenticated | S::Scanned),
        Step::ResolveAddress | Step::Configure => {
            matches!(status, S::Authenticated | S::Scanned | S::Registering)
        }
        Step::StartAssociation => status == S::Registering,
        Step::AwaitAssociation => status == S::Joining,
        Step::QueryPower => status == S::Joined,
    }
}

/// [`permits`] as a `Result`.
pub fn ensure(status: JoinStatus, step: Step) -> Result<()> {
    if permits(status, step) {
        Ok(())
    } else {
        Err(Error::InvalidState {
            status,
            operation: step.name(),
        })
    }
}

/// Event an operation error drives, if any.
///
/// Waits that ran out of time or were cancelled, and calls rejected before
/// any I/O, leave the status where it was.
pub fn failure_event(err: &Error) -> Option<JoinEvent> {
    match err {
        Error::Timeout
        | Error::Cancelled
        | Error::InvalidParameter(_)
        | Error::InvalidState { .. } => None,
        _ => Some(JoinEvent::StepFailed),
    }
}

/// Collects `EPANDESC` blocks until the active scan completes.
#[derive(Debug, Default)]
pub struct ScanCollector {
    blocks: Vec<BTreeMap<String, String>>,
}

impl ScanCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks seen so far.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn on_reply(&mut self, reply: Reply) -> Result<Wait<ScannedPan>> {
        match reply {
            Reply::Fail(reason) => Err(Error::Protocol(reason)),
            Reply::PanDescHeader => {
                self.blocks.push(BTreeMap::new());
                Ok(Wait::Continue)
            }
            Reply::Field { key, value } => {
                if self.blocks.is_empty() {
                    self.blocks.push(BTreeMap::new());
                }
                if let Some(block) = self.blocks.last_mut() {
                    block.insert(key, value);
                }
                Ok(Wait::Continue)
            }
            Reply::Event(e) if e.code == event::ACTIVE_SCAN_COMPLETE => self.finish().map(Wait::Done),
            other => {
                trace!(?other, "scan: discarding");
                Ok(Wait::Continue)
            }
        }
    }

    /// Pick the best PAN once scanning is over.
    pub fn finish(&mut self) -> Result<ScannedPan> {
        let blocks = std::mem::take(&mut self.blocks);
        let mut best: Option<ScannedPan> = None;
        for block in &blocks {
            let pan = commands::parse_scan_fields(block)?;
            debug!(mac = %pan.mac_address, lqi = pan.lqi, channel = pan.channel, "PAN found");
            if best.as_ref().is_none_or(|b| pan.lqi > b.lqi) {
                best = Some(pan);
            }
        }
        best.ok_or_else(|| Error::Protocol("no PAN descriptor received".into()))
    }
}

/// Wait for the address `SKLL64` prints.
///
/// The command echo and blank lines are skipped.
pub fn resolved_address(reply: Reply) -> Result<Wait<String>> {
    match reply {
        Reply::Fail(reason) => Err(Error::Protocol(reason)),
        Reply::Other(text) if !text.is_empty() => match text.parse::<Ipv6Addr>() {
            Ok(_) => Ok(Wait::Done(text)),
            Err(_) => Err(Error::Decode(format!(
                "invalid link-local address {text:?}"
            ))),
        },
        other => {
            trace!(?other, "resolve: discarding");
            Ok(Wait::Continue)
        }
    }
}

/// How PANA authentication ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Association {
    Accepted(Event),
    Rejected(Event),
}

/// Wait for `EVENT 25` or `EVENT 24`. Nothing else ends the wait.
pub fn association_result(reply: Reply) -> Result<Wait<Association>> {
    match reply {
        Reply::Event(e) if e.code == event::PANA_SUCCEEDED => Ok(Wait::Done(Association::Accepted(e))),
        Reply::Event(e) if e.code == event::PANA_FAILED => Ok(Wait::Done(Association::Rejected(e))),
        other => {
            trace!(?other, "association: discarding");
            Ok(Wait::Continue)
        }
    }
}
