// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Real MIDI ports through [`midir`].

use std::{cell::RefCell, fmt};

use midir::{
    ConnectError, Ignore, InitError, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput,
    MidiOutputPort, SendError,
};
use thiserror::Error;

use crate::{host::MidiOut, TimeStamp};

#[derive(Debug, Error)]
pub enum MidirPortError {
    #[error("no {direction} port with name prefix \"{prefix}\"")]
    NotFound {
        direction: &'static str,
        prefix: String,
    },
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    ConnectInput(#[from] ConnectError<MidiInput>),
    #[error(transparent)]
    ConnectOutput(#[from] ConnectError<MidiOutput>),
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Sink for raw MIDI bytes.
pub trait MidiOutputConnection {
    fn send_midi_output(&mut self, output: &[u8]) -> Result<(), MidirPortError>;
}

impl MidiOutputConnection for midir::MidiOutputConnection {
    fn send_midi_output(&mut self, output: &[u8]) -> Result<(), MidirPortError> {
        self.send(output).map_err(Into::into)
    }
}

/// Output port for feedback.
///
/// Send failures are logged and otherwise ignored, i.e. feedback
/// is lost while the device is disconnected.
pub struct MidirOutput<C = midir::MidiOutputConnection> {
    port_name: String,
    connection: RefCell<C>,
}

impl<C> fmt::Debug for MidirOutput<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidirOutput")
            .field("port_name", &self.port_name)
            .finish_non_exhaustive()
    }
}

impl<C: MidiOutputConnection> MidirOutput<C> {
    #[must_use]
    pub fn new(port_name: impl Into<String>, connection: C) -> Self {
        Self {
            port_name: port_name.into(),
            connection: RefCell::new(connection),
        }
    }

    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    #[must_use]
    pub fn into_connection(self) -> C {
        self.connection.into_inner()
    }

    fn send(&self, output: &[u8]) {
        log::trace!(
            "Sending MIDI output to \"{port_name}\": {output:0x?}",
            port_name = self.port_name
        );
        if let Err(err) = self.connection.borrow_mut().send_midi_output(output) {
            log::warn!(
                "Failed to send MIDI output {output:0x?} to \"{port_name}\": {err}",
                port_name = self.port_name
            );
        }
    }
}

impl<C: MidiOutputConnection> MidiOut for MidirOutput<C> {
    fn send_midi(&self, status: u8, data1: u8, data2: u8) {
        self.send(&[status, data1, data2]);
    }

    fn send_sysex(&self, data: &[u8]) {
        self.send(data);
    }
}

/// Finds and connects ports by their name.
#[allow(missing_debug_implementations)]
pub struct MidirPortManager {
    client_name: String,
    input: MidiInput,
    output: MidiOutput,
}

impl MidirPortManager {
    pub fn new(client_name: impl Into<String>) -> Result<Self, MidirPortError> {
        let client_name = client_name.into();
        let mut input = MidiInput::new(&format!("{client_name} input port watcher"))?;
        input.ignore(Ignore::None);
        let output = MidiOutput::new(&format!("{client_name} output port watcher"))?;
        Ok(Self {
            client_name,
            input,
            output,
        })
    }

    #[must_use]
    pub fn input_port_names(&self) -> Vec<String> {
        self.input
            .ports()
            .iter()
            .filter_map(|port| self.input.port_name(port).ok())
            .collect()
    }

    #[must_use]
    pub fn output_port_names(&self) -> Vec<String> {
        self.output
            .ports()
            .iter()
            .filter_map(|port| self.output.port_name(port).ok())
            .collect()
    }

    fn find_input_port(&self, prefix: &str) -> Result<(String, MidiInputPort), MidirPortError> {
        self.input
            .ports()
            .into_iter()
            .find_map(|port| {
                let port_name = self.input.port_name(&port).ok()?;
                port_name.starts_with(prefix).then_some((port_name, port))
            })
            .ok_or_else(|| MidirPortError::NotFound {
                direction: "input",
                prefix: prefix.to_owned(),
            })
    }

    fn find_output_port(&self, prefix: &str) -> Result<(String, MidiOutputPort), MidirPortError> {
        self.output
            .ports()
            .into_iter()
            .find_map(|port| {
                let port_name = self.output.port_name(&port).ok()?;
                port_name.starts_with(prefix).then_some((port_name, port))
            })
            .ok_or_else(|| MidirPortError::NotFound {
                direction: "output",
                prefix: prefix.to_owned(),
            })
    }

    /// Connect the first input port whose name starts with `prefix`.
    ///
    /// The handler is invoked on the thread of the MIDI backend.
    pub fn connect_input<F>(
        &self,
        prefix: &str,
        mut handle_input: F,
    ) -> Result<MidiInputConnection<()>, MidirPortError>
    where
        F: FnMut(TimeStamp, &[u8]) + Send + 'static,
    {
        let (port_name, port) = self.find_input_port(prefix)?;
        log::info!("Connecting input port \"{port_name}\"");
        let mut input = MidiInput::new(&self.client_name)?;
        input.ignore(Ignore::None);
        input
            .connect(
                &port,
                &port_name,
                move |micros, input, _| {
                    let ts = TimeStamp::from_micros(micros);
                    log::trace!("Received MIDI input: {ts} {input:0x?}");
                    handle_input(ts, input);
                },
                (),
            )
            .map_err(Into::into)
    }

    /// Connect the first output port whose name starts with `prefix`.
    pub fn connect_output(&self, prefix: &str) -> Result<MidirOutput, MidirPortError> {
        let (port_name, port) = self.find_output_port(prefix)?;
        log::info!("Connecting output port \"{port_name}\"");
        let output = MidiOutput::new(&self.client_name)?;
        let connection = output.connect(&port, &port_name)?;
        Ok(MidirOutput::new(port_name, connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingConnection {
        sent: Vec<Vec<u8>>,
        fail: bool,
    }

    impl MidiOutputConnection for RecordingConnection {
        fn send_midi_output(&mut self, output: &[u8]) -> Result<(), MidirPortError> {
            if self.fail {
                return Err(MidirPortError::NotFound {
                    direction: "output",
                    prefix: "test".to_owned(),
                });
            }
            self.sent.push(output.to_vec());
            Ok(())
        }
    }

    #[test]
    fn sends_raw_bytes() {
        let output = MidirOutput::new("test", RecordingConnection::default());
        output.send_midi(0x90, 60, 127);
        output.send_sysex(&[0xf0, 0x7e, 0xf7]);
        assert_eq!(
            vec![vec![0x90, 60, 127], vec![0xf0, 0x7e, 0xf7]],
            output.into_connection().sent
        );
    }

    #[test]
    fn send_failures_are_swallowed() {
        let output = MidirOutput::new(
            "test",
            RecordingConnection {
                fail: true,
                ..Default::default()
            },
        );
        output.send_midi(0xb0, 1, 2);
        assert!(output.into_connection().sent.is_empty());
    }
}
