//! JACK transport backend for [`Driver`], plus the JACK audio process callback that drives
//! an interface's realtime side.
//!
//! Grounded on `original_source/amio/jack_interface.h`/`jack_driver.c`: one stereo input port
//! pair and one stereo output port pair per client; `jack_driver.c`'s `process()` reads the
//! input ports, calls `process_input_with_buffers`, then reads the output ports and calls
//! `process_input_output_with_buffers`. Port creation and the `jack` crate's client lifecycle
//! are not exercised by this crate's test suite (see `DESIGN.md`); only the `Driver` trait
//! boundary and [`crate::amio_core::interface::Interface::process_input`]/`process_realtime`
//! are.

use amio_core::driver::Driver;
use amio_core::ids::InterfaceId;
use std::fmt;

pub struct JackDriver {
    inner: Option<Inner>,
}

enum Inner {
    /// Client and ports exist but no process callback is registered yet - the interface this
    /// driver belongs to doesn't have an id until after `Engine::create_interface` returns
    /// one, and the process callback needs that id to know which interface to drive.
    Pending {
        client: jack::Client,
        input_l: jack::Port<jack::AudioIn>,
        input_r: jack::Port<jack::AudioIn>,
        output_l: jack::Port<jack::AudioOut>,
        output_r: jack::Port<jack::AudioOut>,
    },
    Active(jack::AsyncClient<(), AudioProcessHandler>),
}

#[derive(Debug)]
pub struct JackDriverError(String);

impl fmt::Display for JackDriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for JackDriverError {}

impl JackDriver {
    pub fn new(client_name: &str) -> Result<Self, JackDriverError> {
        let (client, _status) = jack::Client::new(client_name, jack::ClientOptions::NO_START_SERVER)
            .map_err(|e| JackDriverError(e.to_string()))?;

        let input_l = client
            .register_port("input_l", jack::AudioIn::default())
            .map_err(|e| JackDriverError(e.to_string()))?;
        let input_r = client
            .register_port("input_r", jack::AudioIn::default())
            .map_err(|e| JackDriverError(e.to_string()))?;
        let output_l = client
            .register_port("output_l", jack::AudioOut::default())
            .map_err(|e| JackDriverError(e.to_string()))?;
        let output_r = client
            .register_port("output_r", jack::AudioOut::default())
            .map_err(|e| JackDriverError(e.to_string()))?;

        Ok(Self {
            inner: Some(Inner::Pending { client, input_l, input_r, output_l, output_r }),
        })
    }

    /// Registers the process callback and activates the client, now that `interface_id` is
    /// known. Every realtime callback from this point on looks `interface_id` up in the
    /// process-wide engine and drives its `process_input`/`process_realtime`. Idempotent
    /// calls after the first return an error rather than re-activating.
    pub fn activate(&mut self, interface_id: InterfaceId) -> Result<(), JackDriverError> {
        let Some(Inner::Pending { client, input_l, input_r, output_l, output_r }) = self.inner.take() else {
            return Err(JackDriverError("jack driver already activated".to_string()));
        };
        let handler = AudioProcessHandler { interface_id, input_l, input_r, output_l, output_r };
        let async_client = client
            .activate_async((), handler)
            .map_err(|e| JackDriverError(e.to_string()))?;
        self.inner = Some(Inner::Active(async_client));
        Ok(())
    }

    fn client(&self) -> Option<&jack::Client> {
        match &self.inner {
            Some(Inner::Pending { client, .. }) => Some(client),
            Some(Inner::Active(async_client)) => Some(async_client.as_client()),
            None => None,
        }
    }
}

impl Driver for JackDriver {
    fn set_position(&mut self, frame: i64) {
        let frame = frame.max(0) as jack::Frames;
        let Some(client) = self.client() else { return };
        if let Err(e) = client.transport_locate(frame) {
            tracing::warn!(error = %e, frame, "jack transport_locate failed");
        }
    }

    fn set_is_transport_rolling(&mut self, rolling: bool) {
        let Some(client) = self.client() else { return };
        let result = if rolling { client.transport_start() } else { client.transport_stop() };
        if let Err(e) = result {
            tracing::warn!(error = %e, rolling, "jack transport start/stop failed");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.client().map(|c| c.sample_rate() as u32).unwrap_or(0)
    }
}

/// The actual JACK process callback. Reads the input ports, feeds them to
/// `Interface::process_input`, then reads the output ports and drives
/// `Engine::process_realtime` - the two halves `jack_driver.c`'s `process()` keeps separate.
struct AudioProcessHandler {
    interface_id: InterfaceId,
    input_l: jack::Port<jack::AudioIn>,
    input_r: jack::Port<jack::AudioIn>,
    output_l: jack::Port<jack::AudioOut>,
    output_r: jack::Port<jack::AudioOut>,
}

impl jack::ProcessHandler for AudioProcessHandler {
    fn process(&mut self, _client: &jack::Client, scope: &jack::ProcessScope) -> jack::Control {
        let in_l = self.input_l.as_slice(scope);
        let in_r = self.input_r.as_slice(scope);
        let out_l = self.output_l.as_mut_slice(scope);
        let out_r = self.output_r.as_mut_slice(scope);
        let nframes = out_l.len() as i64;

        let mut engine = crate::engine().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(iface) = engine.interface_mut(self.interface_id) {
            iface.process_input(in_l, in_r);
        }
        engine.process_realtime(self.interface_id, nframes, out_l, out_r);
        jack::Control::Continue
    }
}
