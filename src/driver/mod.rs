// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Standalone driver without a DAW host.
//!
//! The [`Session`] is not thread-safe and therefore lives on a
//! dedicated thread that receives MIDI input through a channel.

use std::{rc::Rc, time::Duration};

use futures_util::future::{AbortHandle, Abortable, Aborted};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};

use crate::{host::MidiOut, midi::MIDI_STATUS_SYSEX, PortIndex, Session, SessionConfig};

mod host;
use self::host::DriverHost;

#[cfg(test)]
mod tests;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub session: SessionConfig,

    pub num_inputs: usize,

    /// Interval for flushing feedback and running scheduled tasks.
    pub tick_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            session: Default::default(),
            num_inputs: 1,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

#[derive(Debug)]
enum DriverMessage {
    Midi {
        port: PortIndex,
        status: u8,
        data1: u8,
        data2: u8,
    },
    Sysex {
        port: PortIndex,
        data: Vec<u8>,
    },
}

#[derive(Debug, Error)]
#[error("driver thread disconnected")]
pub struct DriverDisconnected;

/// Feeds MIDI input into the driver thread.
///
/// Could be used from any thread, e.g. from the callback of a MIDI backend.
#[derive(Debug, Clone)]
pub struct DriverInput {
    tx: mpsc::UnboundedSender<DriverMessage>,
}

impl DriverInput {
    /// Forward a raw MIDI message.
    ///
    /// Channel messages with less than 2 data bytes are padded with 0.
    pub fn send_midi(&self, port: PortIndex, input: &[u8]) -> Result<(), DriverDisconnected> {
        let message = match input {
            [] => return Ok(()),
            [MIDI_STATUS_SYSEX, ..] => DriverMessage::Sysex {
                port,
                data: input.to_vec(),
            },
            [status] => DriverMessage::Midi {
                port,
                status: *status,
                data1: 0,
                data2: 0,
            },
            [status, data1] => DriverMessage::Midi {
                port,
                status: *status,
                data1: *data1,
                data2: 0,
            },
            [status, data1, data2, ..] => DriverMessage::Midi {
                port,
                status: *status,
                data1: *data1,
                data2: *data2,
            },
        };
        self.tx.send(message).map_err(|_| DriverDisconnected)
    }
}

/// Output port that could be moved onto the driver thread.
pub type SendableMidiOut = Box<dyn MidiOut + Send>;

/// Dedicated thread that owns a [`Session`].
#[derive(Debug)]
pub struct DriverThread {
    abort_handle: AbortHandle,
    os_thread: std::thread::JoinHandle<()>,
}

impl DriverThread {
    /// Spawn the thread and set up the session.
    ///
    /// The state returned by `setup` is kept alive until the thread exits.
    /// The thread exits when all [`DriverInput`]s have been dropped or when
    /// it is aborted.
    pub fn spawn<F, T>(
        config: DriverConfig,
        outputs: Vec<SendableMidiOut>,
        setup: F,
    ) -> (Self, DriverInput)
    where
        F: FnOnce(&Rc<Session>) -> anyhow::Result<T> + Send + 'static,
        T: 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let os_thread = std::thread::spawn(move || {
            log::info!("Entering driver thread");
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("Failed to create Tokio runtime: {err}");
                    return;
                }
            };
            let DriverConfig {
                session: session_config,
                num_inputs,
                tick_interval,
            } = config;
            let outputs = outputs
                .into_iter()
                .map(|output| Rc::<dyn MidiOut + Send>::from(output) as Rc<dyn MidiOut>)
                .collect();
            let host = Rc::new(DriverHost::new(num_inputs, outputs));
            let session = Session::new(Rc::clone(&host) as _, session_config);
            let state = match setup(&session) {
                Ok(state) => state,
                Err(err) => {
                    log::error!("Failed to set up session: {err}");
                    return;
                }
            };
            let driver_task = Abortable::new(
                run(Rc::clone(&host), Rc::clone(&session), rx, tick_interval),
                abort_registration,
            );
            runtime.block_on(async move {
                log::info!("Running driver task");
                match driver_task.await {
                    Ok(()) => {
                        log::info!("Driver task terminated");
                    }
                    Err(Aborted) => {
                        log::info!("Driver task aborted");
                    }
                }
            });
            session.exit();
            drop(state);
            log::info!("Exiting driver thread");
        });
        let driver_thread = Self {
            abort_handle,
            os_thread,
        };
        (driver_thread, DriverInput { tx })
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.os_thread.is_finished()
    }

    /// Wait until the thread exits after all inputs have been dropped.
    pub fn join(self) -> anyhow::Result<()> {
        self.os_thread
            .join()
            .map_err(|err| anyhow::anyhow!("Driver thread panicked: {err:?}"))
    }

    pub fn abort_and_join(self) -> anyhow::Result<()> {
        let Self {
            abort_handle,
            os_thread,
        } = self;
        abort_handle.abort();
        os_thread
            .join()
            .map_err(|err| anyhow::anyhow!("Driver thread panicked: {err:?}"))
    }
}

async fn run(
    host: Rc<DriverHost>,
    session: Rc<Session>,
    mut rx: mpsc::UnboundedReceiver<DriverMessage>,
    tick_interval: Duration,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else {
                    log::debug!("All driver inputs dropped");
                    break;
                };
                dispatch(&host, message);
            }
            now = interval.tick() => {
                tick(&host, &session, now);
            }
        }
    }
}

fn dispatch(host: &DriverHost, message: DriverMessage) {
    log::trace!("Dispatching {message:?}");
    match message {
        DriverMessage::Midi {
            port,
            status,
            data1,
            data2,
        } => {
            let Some(input) = host.input(port) else {
                log::warn!("Received MIDI input from unknown port {port}");
                return;
            };
            input.receive_midi(status, data1, data2);
        }
        DriverMessage::Sysex { port, data } => {
            let Some(input) = host.input(port) else {
                log::warn!("Received SysEx input from unknown port {port}");
                return;
            };
            input.receive_sysex(&data);
        }
    }
}

fn tick(host: &DriverHost, session: &Session, now: Instant) {
    let task_count = host.run_due_tasks(now.into_std());
    if task_count > 0 {
        log::trace!("Executed {task_count} scheduled task(s)");
    }
    session.flush();
}
