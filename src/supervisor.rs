//! Owns the core's lifetime: construction, the cooperative event loop
//! (§4.5.6), reconnect-with-backoff, and termination/reload signals (§5, §9
//! "Mutable global process state" — signals set a field here, the loop
//! polls it, rather than file-level flags).
//!
//! Grounded on `examples/original_source/DAPNETGateway.cpp`'s `run()` main
//! loop, and on the teacher's `main.rs` for the tokio task/signal shape.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::downstream::link::encode_frame;
use crate::downstream::{Beacon, DownstreamLink};
use crate::error::GatewayError;
use crate::filter::{Filter, Verdict};
use crate::scheduler::{Dispatcher, SendDecision};
use crate::upstream::link::backoff_for;
use crate::upstream::{ReadOutcome, UpstreamEngine, UpstreamLink};

/// Cadence of the main loop body (§4.5.6: "cadence ~= 10 ms").
const LOOP_SLEEP: Duration = Duration::from_millis(10);

/// `read(timeout=0)`, modelled as an effectively-immediate poll rather than
/// a literal zero, which would busy-spin the OS call.
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

pub struct Supervisor {
    config: Config,
    killed: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            killed: Arc::new(AtomicBool::new(false)),
            reload: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the termination and reload signal handlers. `killed` maps to
    /// an external SIGTERM-equivalent; `reload` to a SIGHUP-equivalent
    /// full re-run (§5).
    fn spawn_signal_handlers(&self) {
        let killed = self.killed.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                killed.store(true, Ordering::SeqCst);
            }
        });

        #[cfg(unix)]
        {
            let reload = self.reload.clone();
            tokio::spawn(async move {
                let Ok(mut hangup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
                else {
                    return;
                };
                loop {
                    hangup.recv().await;
                    reload.store(true, Ordering::SeqCst);
                }
            });
        }
    }

    /// Outer loop: construct the core, run it until torn down, and either
    /// exit (killed) or reconstruct from scratch (reload) — queue and all
    /// other core state are not preserved across a reload (§5, §9).
    pub async fn run(&mut self) -> Result<(), GatewayError> {
        self.spawn_signal_handlers();

        loop {
            self.run_core().await?;
            if self.killed.load(Ordering::SeqCst) {
                info!("shutting down");
                return Ok(());
            }
            if self.reload.swap(false, Ordering::SeqCst) {
                info!("reload signal received, restarting the core");
                continue;
            }
            return Ok(());
        }
    }

    /// One full lifetime of the core: connect, log in, loop, reconnect on
    /// failure, and return only on `killed` or `reload`.
    async fn run_core(&mut self) -> Result<(), GatewayError> {
        let general = &self.config.general;

        let downstream = DownstreamLink::open(
            &general.local_address,
            general.local_port,
            &general.rpt_address,
            general.rpt_port,
        )
        .await?;

        let filter = Filter::from_lists(
            general.white_list.clone(),
            general.black_list.clone(),
            general.blacklist_regex_file.as_deref(),
            general.whitelist_regex_file.as_deref(),
        );

        let mut dispatcher = Dispatcher::new();
        let mut engine = UpstreamEngine::new();
        let mut upstream = self.connect_and_login(&mut engine).await?;
        let mut cached_schedule: Option<crate::schedule::Schedule> = None;

        loop {
            if self.killed.load(Ordering::SeqCst) || self.reload.load(Ordering::SeqCst) {
                upstream.close().await;
                return Ok(());
            }

            // 1. Drain one downstream datagram; update ModemIdle.
            if let Some(result) = downstream.recv_beacon(POLL_TIMEOUT).await {
                match result {
                    Ok(beacon) => {
                        let raw_byte: u8 = if beacon == Beacon::Idle { 0x00 } else { 0xFF };
                        trace!(hex = %hex::encode([raw_byte]), ?beacon, "downstream beacon");
                        dispatcher.set_modem_idle(beacon == Beacon::Idle);
                    }
                    Err(e) => warn!(error = %e, "downstream read error"),
                }
            }

            // 2. Drain one upstream line; reconnect on Closed/Error.
            match upstream.read(POLL_TIMEOUT).await {
                ReadOutcome::Line(line) => {
                    trace!(hex = %hex::encode(&line), line = %String::from_utf8_lossy(&line), "upstream raw line");
                    for write in engine.process_line(&line).await {
                        trace!(hex = %hex::encode(&write), "upstream raw write");
                        if let Err(e) = upstream.write(&write).await {
                            warn!(error = %e, "upstream write failed");
                        }
                    }
                }
                ReadOutcome::Timeout => {}
                ReadOutcome::Closed | ReadOutcome::Error(_) => {
                    warn!("upstream connection lost, reconnecting");
                    upstream = self.connect_and_login(&mut engine).await?;
                }
            }

            // 3. Drain one published message; filter; enqueue.
            if let Some(message) = engine.take_next_message() {
                match filter.evaluate(&message) {
                    Verdict::Accept => {
                        debug!(ric = message.ric, functional = ?message.functional, "message accepted into queue");
                        dispatcher.queue.push(message);
                        debug!(depth = dispatcher.queue.len(), "messages in queue");
                    }
                    verdict => debug!(
                        ric = message.ric,
                        functional = ?message.functional,
                        ?verdict,
                        "message dropped by filter"
                    ),
                }
            }

            // 4. Advance the slot clock; refresh the schedule at slot change.
            // A schedule that arrives mid-slot is cached here and consumed
            // lazily at the next slot boundary (§4.5.1, §5's "no later than
            // the next slot boundary" ordering guarantee).
            if let Some(fresh) = engine.take_schedule() {
                cached_schedule = Some(fresh);
            }
            dispatcher.advance_clock(&mut cached_schedule);

            // 5. Invoke the send decision.
            let decision = dispatcher
                .decide_and_send(|message| async move {
                    trace!(hex = %hex::encode(encode_frame(&message)), "downstream raw frame");
                    match downstream.send(&message).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(error = %e, "downstream write failed");
                            // §7 "Downstream write error": no feedback
                            // channel, so we still count it as sent.
                            true
                        }
                    }
                })
                .await;
            if decision == SendDecision::Sent {
                debug!(slot = dispatcher.current_slot(), "message sent to downstream");
            }

            // 6. Cooperative yield.
            tokio::time::sleep(LOOP_SLEEP).await;
        }
    }

    /// `close(); sleep(backoff[fail_count]); open(); login()` in a loop
    /// until login succeeds (§4.1).
    async fn connect_and_login(&self, engine: &mut UpstreamEngine) -> Result<UpstreamLink, GatewayError> {
        loop {
            match UpstreamLink::open(&self.config.dapnet.address, self.config.dapnet.port).await {
                Ok(mut link) => {
                    let login_line = format!(
                        "[DAPNETGateway v{} {} {}]\r\n",
                        env!("CARGO_PKG_VERSION"),
                        self.config.general.callsign.to_lowercase(),
                        self.config.dapnet.auth_key,
                    );
                    if link.write(login_line.as_bytes()).await.is_err() {
                        link.close().await;
                        tokio::time::sleep(backoff_for(engine.fail_count())).await;
                        continue;
                    }

                    if self.wait_for_login(&mut link, engine).await {
                        return Ok(link);
                    }
                    link.close().await;
                }
                // §4.1/§7: an unresolvable address is fatal, not a
                // transient connection error — never retried, here or at
                // startup (mirrors `DownstreamLink::open`'s propagation
                // via `?` for C3).
                Err(e @ GatewayError::UpstreamUnresolved(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "unable to open upstream connection, retrying");
                    tokio::time::sleep(backoff_for(engine.fail_count())).await;
                }
            }
        }
    }

    /// Process lines until the engine reports `logged_in` (marked on the
    /// first `2…` time-sync record after connect, per §4.2's table) or the
    /// connection drops.
    async fn wait_for_login(&self, link: &mut UpstreamLink, engine: &mut UpstreamEngine) -> bool {
        while !engine.logged_in() {
            match link.read(Duration::from_secs(5)).await {
                ReadOutcome::Line(line) => {
                    for write in engine.process_line(&line).await {
                        let _ = link.write(&write).await;
                    }
                }
                ReadOutcome::Timeout => continue,
                ReadOutcome::Closed | ReadOutcome::Error(_) => return false,
            }
        }
        true
    }
}
