//! Abstraction over the host transport, decoupling the engine core from any one audio
//! backend.
//!
//! Grounded on `original_source/amio/driver.h`/`jack_interface.h`: the original couples every
//! `Interface` directly to a `jack_client_t*` and calls `jack_transport_*` functions inline.
//! Here that surface is narrowed to exactly what [`crate::interface::Interface`] needs to
//! report back to the control thread, so `amio-ffi`'s `JackDriver` is the only thing that
//! knows about the `jack` crate; tests exercise [`crate::interface::Interface`] against a
//! driver that holds its state in memory instead.

/// Host transport operations the realtime thread calls while applying position/transport
/// updates it has drained off the control queue.
pub trait Driver: Send {
    /// Moves the host transport to `frame`. Called from the realtime callback.
    fn set_position(&mut self, frame: i64);

    /// Starts or stops the host transport. Called from the realtime callback.
    fn set_is_transport_rolling(&mut self, rolling: bool);

    /// The sample rate the driver discovered at connection time. Reported once, at
    /// [`crate::interface::Interface::new`], so that `iface_get_frame_rate` reflects it
    /// (mirrors `jack_get_sample_rate` posted via `py_thread_receive_frame_rate` right after
    /// `jack_client_open`). `0` for drivers with no notion of a discovered rate.
    fn sample_rate(&self) -> u32 {
        0
    }
}

/// An in-memory [`Driver`] that just remembers the last values it was given. Used by
/// `Interface` tests and anywhere a real JACK client isn't available.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordingDriver {
    pub position: i64,
    pub is_transport_rolling: bool,
    pub sample_rate: u32,
}

impl Driver for RecordingDriver {
    fn set_position(&mut self, frame: i64) {
        self.position = frame;
    }

    fn set_is_transport_rolling(&mut self, rolling: bool) {
        self.is_transport_rolling = rolling;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_driver_remembers_last_values() {
        // Given
        let mut driver = RecordingDriver::default();
        // When
        driver.set_position(42);
        driver.set_is_transport_rolling(true);
        // Then
        assert_eq!(driver.position, 42);
        assert!(driver.is_transport_rolling);
    }
}
