//! Route B session: the join sequence and the power query.

use std::net::Ipv6Addr;

use tracing::{debug, info, instrument, warn};

use routeb_core::deadline::Deadline;
use routeb_core::error::{Error, Result};
use routeb_core::transport::Transport;
use routeb_core::types::{JoinStatus, PanDescriptor, PowerReading};

use crate::commands;
use crate::echonet;
use crate::engine::CommandEngine;
use crate::framer::FramerConfig;
use crate::join::{self, Association, JoinEvent, ScanCollector, Step};

/// A session with one SKSTACK module.
///
/// Operations are meant to be called in join order: [`authenticate`],
/// [`scan`], [`set_channel`] and [`set_pan_id`], [`start_association`],
/// [`await_association_result`]. After that [`get_instant_power`] may be
/// called any number of times. Calls out of order fail with
/// [`Error::InvalidState`] without touching the device.
///
/// A timeout or cancellation leaves the status unchanged and the step may
/// be retried. Any other failure moves the session to
/// [`JoinStatus::Failed`]; [`reset`] starts over.
///
/// [`authenticate`]: Self::authenticate
/// [`scan`]: Self::scan
/// [`set_channel`]: Self::set_channel
/// [`set_pan_id`]: Self::set_pan_id
/// [`start_association`]: Self::start_association
/// [`await_association_result`]: Self::await_association_result
/// [`get_instant_power`]: Self::get_instant_power
/// [`reset`]: Self::reset
pub struct RouteBSession {
    engine: CommandEngine,
    status: JoinStatus,
}

impl RouteBSession {
    pub fn new(transport: Box<dyn Transport>, config: FramerConfig) -> Self {
        RouteBSession {
            engine: CommandEngine::new(transport, config),
            status: JoinStatus::Disconnected,
        }
    }

    pub fn status(&self) -> JoinStatus {
        self.status
    }

    /// Back to [`JoinStatus::Disconnected`]. Buffered bytes are kept.
    pub fn reset(&mut self) {
        self.apply(JoinEvent::Reset);
    }

    /// Bytes read from the module that are not yet part of a line.
    pub fn remainder(&self) -> &[u8] {
        self.engine.remainder()
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    /// Set the Route B password and ID.
    #[instrument(skip_all)]
    pub async fn authenticate(&mut self, id: &str, password: &str, deadline: &Deadline) -> Result<()> {
        join::ensure(self.status, Step::Authenticate)?;
        let set_password = commands::set_password(password)?;
        let set_id = commands::set_route_b_id(id)?;

        let result = async {
            self.engine.command(&set_password, deadline).await?;
            self.engine.command(&set_id, deadline).await?;
            Ok::<(), Error>(())
        }
        .await;
        self.settle(result, Some(JoinEvent::Authenticated))?;
        info!("credentials set");
        Ok(())
    }

    /// Active scan for the meter's PAN.
    ///
    /// `duration` is the module's scan time exponent (0 to 14); every
    /// channel is scanned for about `0.01 s * (2^duration + 1)`. The
    /// returned descriptor has its link-local address resolved.
    #[instrument(skip(self, deadline))]
    pub async fn scan(&mut self, duration: u8, deadline: &Deadline) -> Result<PanDescriptor> {
        join::ensure(self.status, Step::Scan)?;
        let cmd = commands::active_scan(duration)?;

        let result = async {
            self.engine.send(&cmd).await?;
            let mut collector = ScanCollector::new();
            let pan = self
                .engine
                .wait_for(deadline, |reply| collector.on_reply(reply))
                .await?;
            let address = self.resolve(&pan.mac_address, deadline).await?;
            Ok::<_, Error>(pan.into_descriptor(address))
        }
        .await;
        let descriptor = self.settle(result, Some(JoinEvent::Scanned))?;
        info!(
            mac = %descriptor.mac_address,
            channel = descriptor.channel,
            pan_id = %format!("{:04X}", descriptor.pan_id),
            lqi = descriptor.lqi,
            "scan complete"
        );
        Ok(descriptor)
    }

    /// Ask the module for the link-local address of `mac`.
    pub async fn resolve_link_local_address(&mut self, mac: &str, deadline: &Deadline) -> Result<String> {
        join::ensure(self.status, Step::ResolveAddress)?;
        let result = self.resolve(mac, deadline).await;
        self.settle(result, None)
    }

    async fn resolve(&mut self, mac: &str, deadline: &Deadline) -> Result<String> {
        let cmd = commands::link_local_address(mac)?;
        self.engine.send(&cmd).await?;
        let address = self.engine.wait_for(deadline, join::resolved_address).await?;
        debug!(mac, address = %address, "link-local address");
        Ok(address)
    }

    /// Set the radio channel (register S2).
    pub async fn set_channel(&mut self, channel: u8, deadline: &Deadline) -> Result<()> {
        join::ensure(self.status, Step::Configure)?;
        let result = self
            .engine
            .command(&commands::set_channel(channel), deadline)
            .await;
        self.settle(result, Some(JoinEvent::Registered))?;
        info!(channel, "channel set");
        Ok(())
    }

    /// Set the PAN ID (register S3).
    pub async fn set_pan_id(&mut self, pan_id: u16, deadline: &Deadline) -> Result<()> {
        join::ensure(self.status, Step::Configure)?;
        let result = self
            .engine
            .command(&commands::set_pan_id(pan_id), deadline)
            .await;
        self.settle(result, Some(JoinEvent::Registered))?;
        info!(pan_id = %format!("{pan_id:04X}"), "PAN ID set");
        Ok(())
    }

    /// Start PANA authentication with the coordinator at `address`.
    pub async fn start_association(&mut self, address: &str, deadline: &Deadline) -> Result<()> {
        join::ensure(self.status, Step::StartAssociation)?;
        validate_address(address)?;
        let result = self.engine.command(&commands::join(address), deadline).await;
        self.settle(result, Some(JoinEvent::AssociationStarted))?;
        info!(address, "association started");
        Ok(())
    }

    /// Wait for PANA authentication to finish.
    ///
    /// A rejection is reported as [`Error::Protocol`] with the event line.
    pub async fn await_association_result(&mut self, deadline: &Deadline) -> Result<()> {
        join::ensure(self.status, Step::AwaitAssociation)?;
        let result = self
            .engine
            .wait_for(deadline, join::association_result)
            .await;
        match self.settle(result, None)? {
            Association::Accepted(event) => {
                self.apply(JoinEvent::AssociationSucceeded);
                info!(sender = event.sender.as_deref().unwrap_or(""), "joined");
                Ok(())
            }
            Association::Rejected(event) => {
                self.apply(JoinEvent::AssociationRejected);
                warn!(%event, "association rejected");
                Err(Error::Protocol(event.to_string()))
            }
        }
    }

    /// Run the association steps for a known PAN.
    ///
    /// Sets channel and PAN ID, starts PANA against the descriptor's
    /// link-local address and waits for the result.
    pub async fn join(&mut self, pan: &PanDescriptor, deadline: &Deadline) -> Result<()> {
        self.set_channel(pan.channel, deadline).await?;
        self.set_pan_id(pan.pan_id, deadline).await?;
        self.start_association(&pan.link_local_address, deadline).await?;
        self.await_association_result(deadline).await
    }

    /// Query the meter's instantaneous power.
    ///
    /// Failures leave the session joined unless the link itself failed.
    pub async fn get_instant_power(&mut self, address: &str, deadline: &Deadline) -> Result<PowerReading> {
        join::ensure(self.status, Step::QueryPower)?;
        validate_address(address)?;
        let cmd = commands::send_udp(
            address,
            commands::ECHONET_PORT,
            true,
            &echonet::INSTANT_POWER_REQUEST,
        )?;

        let result = async {
            self.engine.send(&cmd).await?;
            self.engine
                .wait_for(deadline, echonet::instant_power_reply)
                .await
        }
        .await;
        match result {
            Ok(watts) => {
                debug!(watts, "instant power");
                Ok(PowerReading::now(watts))
            }
            Err(e) => {
                if e.is_fatal() {
                    self.apply(JoinEvent::StepFailed);
                }
                Err(e)
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.reset();
        self.engine.close().await
    }

    fn apply(&mut self, event: JoinEvent) {
        let next = join::transition(self.status, event);
        if next != self.status {
            debug!(from = %self.status, to = %next, ?event, "join status");
        }
        self.status = next;
    }

    /// Feed an operation's outcome into the state machine.
    fn settle<T>(&mut self, result: Result<T>, on_success: Option<JoinEvent>) -> Result<T> {
        match &result {
            Ok(_) => {
                if let Some(event) = on_success {
                    self.apply(event);
                }
            }
            Err(e) => {
                if let Some(event) = join::failure_event(e) {
                    warn!(error = %e, status = %self.status, "join step failed");
                    self.apply(event);
                }
            }
        }
        result
    }
}

fn validate_address(address: &str) -> Result<()> {
    address
        .parse::<Ipv6Addr>()
        .map(|_| ())
        .map_err(|_| Error::InvalidParameter(format!("not an IPv6 address: {address:?}")))
}
