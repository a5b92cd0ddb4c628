// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    borrow::Cow,
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use crate::{
    control::ControlSet, morpher::SnapshotStore, value::ToggledTransportValue,
    value_set::PageMemory, Error, FlushCoordinator, Host, MidiEventDispatcher,
    MidiFlushDispatcher, PortIndex, Result, TimeStamp, TransportProperty,
};

pub const DEFAULT_DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

pub const DEFAULT_LONG_CLICK_THRESHOLD: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Treat Note-On with velocity 0 as Note-Off on all input ports.
    pub loose_note_off: bool,

    /// Maximum interval between two presses of a double click.
    pub double_click_window: Duration,

    /// Minimum duration of a long click.
    pub long_click_threshold: Duration,

    /// Port for controls that do not specify one.
    pub default_port: PortIndex,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            loose_note_off: true,
            double_click_window: DEFAULT_DOUBLE_CLICK_WINDOW,
            long_click_threshold: DEFAULT_LONG_CLICK_THRESHOLD,
            default_port: PortIndex::default(),
        }
    }
}

/// Identity of a controller script as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub vendor: Cow<'static, str>,
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
    pub uuid: Cow<'static, str>,
    pub author: Cow<'static, str>,
    pub num_midi_in_ports: usize,
    pub num_midi_out_ports: usize,
}

/// A running controller script.
///
/// Owns all per-script registries. Controls, values, and sets hold a
/// reference to their session instead of accessing global state.
pub struct Session {
    host: Rc<dyn Host>,
    config: SessionConfig,
    event_dispatchers: RefCell<BTreeMap<PortIndex, Rc<MidiEventDispatcher>>>,
    flush_dispatchers: RefCell<BTreeMap<PortIndex, Rc<MidiFlushDispatcher>>>,
    flush_coordinator: FlushCoordinator,
    control_sets: RefCell<HashMap<String, Weak<ControlSet>>>,
    transport_values: RefCell<HashMap<TransportProperty, Rc<ToggledTransportValue>>>,
    page_memory: Rc<PageMemory>,
    snapshot_store: Rc<SnapshotStore>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field(
                "input_ports",
                &self.event_dispatchers.borrow().keys().collect::<Vec<_>>(),
            )
            .field(
                "output_ports",
                &self.flush_dispatchers.borrow().keys().collect::<Vec<_>>(),
            )
            .field("flush_coordinator", &self.flush_coordinator)
            .field("control_sets", &self.control_sets.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(host: Rc<dyn Host>, config: SessionConfig) -> Rc<Self> {
        log::info!("Starting session: {config:?}");
        Rc::new(Self {
            host,
            config,
            event_dispatchers: RefCell::default(),
            flush_dispatchers: RefCell::default(),
            flush_coordinator: FlushCoordinator::new(),
            control_sets: RefCell::default(),
            transport_values: RefCell::default(),
            page_memory: Rc::default(),
            snapshot_store: Rc::default(),
        })
    }

    #[must_use]
    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn now(&self) -> TimeStamp {
        self.host.now()
    }

    /// The event dispatcher of an input port, created on first access.
    pub fn midi_event_dispatcher(&self, port: PortIndex) -> Result<Rc<MidiEventDispatcher>> {
        if let Some(dispatcher) = self.event_dispatchers.borrow().get(&port) {
            return Ok(Rc::clone(dispatcher));
        }
        let midi_in = self.host.midi_in(port).ok_or(Error::UnknownPort {
            direction: "input",
            port,
        })?;
        let dispatcher = MidiEventDispatcher::bind(
            port,
            Rc::clone(&self.host),
            midi_in,
            self.config.loose_note_off,
        );
        self.event_dispatchers
            .borrow_mut()
            .insert(port, Rc::clone(&dispatcher));
        Ok(dispatcher)
    }

    /// The flush dispatcher of an output port, created on first access.
    pub fn midi_flush_dispatcher(&self, port: PortIndex) -> Result<Rc<MidiFlushDispatcher>> {
        if let Some(dispatcher) = self.flush_dispatchers.borrow().get(&port) {
            return Ok(Rc::clone(dispatcher));
        }
        let midi_out = self.host.midi_out(port).ok_or(Error::UnknownPort {
            direction: "output",
            port,
        })?;
        let dispatcher = MidiFlushDispatcher::new(port, Rc::clone(&self.host), midi_out);
        self.flush_dispatchers
            .borrow_mut()
            .insert(port, Rc::clone(&dispatcher));
        Ok(dispatcher)
    }

    #[must_use]
    pub fn flush_coordinator(&self) -> &FlushCoordinator {
        &self.flush_coordinator
    }

    /// See [`FlushCoordinator::on_first_flush()`].
    pub fn on_first_flush(&self, handler: impl FnOnce() + 'static) -> Result<()> {
        self.flush_coordinator.on_first_flush(handler)
    }

    /// See [`FlushCoordinator::register_flush_listener()`].
    pub fn register_flush_listener(&self, listener: impl Fn() + 'static) {
        self.flush_coordinator.register_flush_listener(listener);
    }

    /// Send all pending feedback.
    ///
    /// Invoked periodically by the host. The first invocation runs the
    /// first-flush handlers before draining the queues of all output
    /// ports. Flush listeners run last.
    pub fn flush(&self) {
        if !self.flush_coordinator.has_flushed() {
            log::debug!("First flush");
            for handler in self.flush_coordinator.take_first_flush_handlers() {
                handler();
            }
        }
        let dispatchers = self
            .flush_dispatchers
            .borrow()
            .values()
            .map(Rc::clone)
            .collect::<Vec<_>>();
        for dispatcher in dispatchers {
            let sent = dispatcher.drain();
            if sent > 0 {
                log::trace!(
                    "Flushed {sent} message(s) on output port {port}",
                    port = dispatcher.port()
                );
            }
        }
        self.flush_coordinator.notify_listeners();
    }

    /// Shut down the script.
    ///
    /// All live control sets are reset, pending output is sent, and the
    /// registries are cleared.
    pub fn exit(&self) {
        log::info!("Exiting session");
        for control_set in self.control_sets() {
            control_set.reset(Some(0));
        }
        self.flush();
        self.control_sets.borrow_mut().clear();
        self.transport_values.borrow_mut().clear();
    }

    /// Reserve the name of a new control set.
    pub(crate) fn register_control_set(&self, control_set: &Rc<ControlSet>) -> Result<()> {
        let mut control_sets = self.control_sets.borrow_mut();
        let name = control_set.name();
        if control_sets
            .get(name)
            .is_some_and(|registered| registered.strong_count() > 0)
        {
            return Err(Error::DuplicateControlSetName(name.to_owned()));
        }
        control_sets.insert(name.to_owned(), Rc::downgrade(control_set));
        Ok(())
    }

    /// All live control sets, ordered by name.
    #[must_use]
    pub fn control_sets(&self) -> Vec<Rc<ControlSet>> {
        let mut control_sets = self
            .control_sets
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect::<Vec<_>>();
        control_sets.sort_by(|lhs, rhs| lhs.name().cmp(rhs.name()));
        control_sets
    }

    #[must_use]
    pub fn control_set(&self, name: &str) -> Option<Rc<ControlSet>> {
        self.control_sets.borrow().get(name).and_then(Weak::upgrade)
    }

    pub(crate) fn transport_values(
        &self,
    ) -> &RefCell<HashMap<TransportProperty, Rc<ToggledTransportValue>>> {
        &self.transport_values
    }

    #[must_use]
    pub fn page_memory(&self) -> &Rc<PageMemory> {
        &self.page_memory
    }

    #[must_use]
    pub fn snapshot_store(&self) -> &Rc<SnapshotStore> {
        &self.snapshot_store
    }
}
