// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! A small mixer script driven by scripted MIDI input.
//!
//! Run with `RUST_LOG=debug` to see what happens inside.

use std::{borrow::Cow, rc::Rc};

use lep::{
    host::loopback::{LoopbackHost, LoopbackTrackBank},
    midi::{MIDI_STATUS_CC, MIDI_STATUS_NOTE_ON},
    Control, ControlConfig, ControlSet, KnockoutSyncedConfig, KnockoutSyncedValue, Observable,
    ScriptDescriptor, Session, SessionConfig, StandardRangedConfig, TrackWindow, UniformValueSet, Value,
    ValueSetRef,
};

const NUM_TRACKS: u8 = 4;

const DESCRIPTOR: ScriptDescriptor = ScriptDescriptor {
    vendor: Cow::Borrowed("lep"),
    name: Cow::Borrowed("Loopback Mixer"),
    version: Cow::Borrowed(env!("CARGO_PKG_VERSION")),
    uuid: Cow::Borrowed("5b1c6f0e-4a55-4c1b-9d8e-6a0d2f7c3e10"),
    author: Cow::Borrowed("The lep authors"),
    num_midi_in_ports: 1,
    num_midi_out_ports: 1,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaderMode {
    Volume,
    Pan,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    log::info!("Loading {DESCRIPTOR:?}");
    let host = LoopbackHost::new(DESCRIPTOR.num_midi_in_ports, DESCRIPTOR.num_midi_out_ports);
    let session = Session::new(Rc::clone(&host) as _, SessionConfig::default());
    let bank = LoopbackTrackBank::new(NUM_TRACKS.into(), 1, 2);
    let window = TrackWindow::new(&session, Rc::clone(&bank) as _, NUM_TRACKS.into());

    let faders = (0..NUM_TRACKS)
        .map(|cc| {
            Control::new(
                &session,
                ControlConfig::new(format!("Fader {}", cc + 1)).with_value_cc(cc),
            )
        })
        .collect::<lep::Result<Vec<_>>>()?;
    let faders = ControlSet::new(&session, "Faders", faders)?;

    let volume: ValueSetRef = window.volume_value_set("Volume", StandardRangedConfig::default())?;
    let pan: ValueSetRef = window.pan_value_set("Pan", StandardRangedConfig::default())?;

    // Two mode buttons on notes 0 and 1 that select the fader mode
    let mode = Observable::new(FaderMode::Volume);
    let mode_buttons = [FaderMode::Volume, FaderMode::Pan]
        .into_iter()
        .map(|own_mode| {
            KnockoutSyncedValue::new(
                &session,
                format!("{own_mode:?}"),
                own_mode,
                mode.clone(),
                KnockoutSyncedConfig::default(),
            ) as Rc<dyn Value>
        })
        .collect();
    let mode_buttons = UniformValueSet::new(&session, "Modes", 2, mode_buttons)?;
    let buttons = [0, 1]
        .into_iter()
        .map(|note| {
            Control::new(
                &session,
                ControlConfig::new(format!("Mode button {}", note + 1)).with_value_note(note),
            )
        })
        .collect::<lep::Result<Vec<_>>>()?;
    let buttons = ControlSet::new(&session, "Mode buttons", buttons)?;
    buttons.set_value_set(Some(mode_buttons as _))?;

    faders.set_value_set(Some(Rc::clone(&volume)))?;
    let _mode_subscription = mode.subscribe({
        let faders = Rc::clone(&faders);
        move |mode| {
            let value_set = match mode {
                FaderMode::Volume => Rc::clone(&volume),
                FaderMode::Pan => Rc::clone(&pan),
            };
            if let Err(err) = faders.set_value_set(Some(value_set)) {
                log::error!("Failed to switch fader mode: {err}");
            }
        }
    });

    session.flush();
    print_sent(&host, "initial feedback");

    let input = host.input(0);
    input.send(MIDI_STATUS_CC, 0, 100);
    input.send(MIDI_STATUS_CC, 3, 20);
    session.flush();
    print_sent(&host, "after moving faders");

    input.send(MIDI_STATUS_NOTE_ON, 1, 127);
    input.send(MIDI_STATUS_CC, 0, 0);
    session.flush();
    print_sent(&host, "after switching to pan");

    for index in 0..usize::from(NUM_TRACKS) {
        let track = bank.loopback_track(index);
        println!(
            "{name}: volume = {volume}, pan = {pan}",
            name = track.name.value(),
            volume = track.volume.value(),
            pan = track.pan.value(),
        );
    }

    session.exit();
    print_sent(&host, "on exit");
    Ok(())
}

fn print_sent(host: &LoopbackHost, label: &str) {
    println!("MIDI output {label}:");
    for message in host.output(0).take_sent() {
        println!("  {message:?}");
    }
}
