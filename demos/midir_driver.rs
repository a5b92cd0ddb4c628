// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Binds 8 faders of a real MIDI controller to plain values.
//!
//! Usage: `midir-driver <input port prefix> [<output port prefix>]`

use std::io::{stdin, stdout, Write as _};

use lep::{
    driver::SendableMidiOut, midi::midir::MidirPortManager, Control, ControlConfig, ControlSet,
    DriverConfig, DriverThread, PortIndex, UniformValueSet, Value,
};

const NUM_FADERS: u8 = 8;

fn main() {
    pretty_env_logger::init();
    if let Err(err) = run() {
        println!("Error: {err}");
    }
}

fn run() -> anyhow::Result<()> {
    let port_manager = MidirPortManager::new("lep")?;
    let mut args = std::env::args().skip(1);
    let Some(input_prefix) = args.next() else {
        println!("Available input ports:");
        for port_name in port_manager.input_port_names() {
            println!("  {port_name}");
        }
        anyhow::bail!("missing input port prefix");
    };
    let output_prefix = args.next().unwrap_or_else(|| input_prefix.clone());
    let output = port_manager.connect_output(&output_prefix)?;

    let (driver_thread, driver_input) = DriverThread::spawn(
        DriverConfig::default(),
        vec![Box::new(output) as SendableMidiOut],
        |session| {
            let controls = (0..NUM_FADERS)
                .map(|cc| {
                    Control::new(
                        session,
                        ControlConfig::new(format!("Fader {}", cc + 1)).with_value_cc(cc),
                    )
                })
                .collect::<lep::Result<Vec<_>>>()?;
            let faders = ControlSet::new(session, "Faders", controls)?;
            let values = UniformValueSet::from_fn(
                session,
                "Levels",
                NUM_FADERS.into(),
                NUM_FADERS.into(),
                |index| {
                    let value = lep::BaseValue::new(format!("Level {}", index + 1), 0);
                    value
                        .observable()
                        .subscribe(move |level| log::info!("Level {}: {level}", index + 1))
                        .persist();
                    value as std::rc::Rc<dyn Value>
                },
            )?;
            faders.set_value_set(Some(values as _))?;
            Ok(faders)
        },
    );

    let _input_connection = port_manager.connect_input(&input_prefix, {
        let driver_input = driver_input.clone();
        move |_ts, input| {
            if driver_input.send_midi(PortIndex::new(0), input).is_err() {
                log::debug!("Dropping MIDI input after the driver has exited");
            }
        }
    })?;
    drop(driver_input);

    print!("Move the faders, press ENTER to exit...");
    stdout().flush()?;
    let mut line = String::new();
    stdin().read_line(&mut line)?;

    driver_thread.abort_and_join()
}
