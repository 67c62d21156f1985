use crate::{
    clock::{elapsed_ms, Clock},
    serial::SerialTransport,
};

/// Idle step between transport polls while waiting out a window
const POLL_STEP_MS: u32 = 1;

/// Half-duplex, line-oriented command/response channel.
///
/// One call is one time window: the command is written, then every byte the
/// modem sends is accumulated until the window closes. An empty reply is a
/// valid result; interpreting it is up to the caller.
pub struct CommandChannel<T, C> {
    transport: T,
    clock: C,
}

impl<T: SerialTransport, C: Clock> CommandChannel<T, C> {
    /// Wrap a transport and clock
    pub fn new(transport: T, clock: C) -> Self {
        Self { transport, clock }
    }

    /// Send `cmd` and collect the reply for the full `timeout_ms` window
    pub fn send_command(&mut self, cmd: &str, timeout_ms: u32) -> String {
        self.send_command_until(cmd, timeout_ms, |_| false)
    }

    /// Send `cmd` and collect the reply until `done` accepts it or `timeout_ms` elapses
    pub fn send_command_until<F>(&mut self, cmd: &str, timeout_ms: u32, done: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        if let Err(e) = self.transport.write_line(cmd) {
            log::warn!("Failed to write {cmd:?}: {e}");
        }
        let mut buf = Vec::with_capacity(128);
        let start = self.clock.now_ms();
        loop {
            let before = buf.len();
            while self.transport.available() {
                match self.transport.read_byte() {
                    Some(b) => buf.push(b),
                    None => break,
                }
            }
            if buf.len() != before && done(&String::from_utf8_lossy(&buf)) {
                break;
            }
            if elapsed_ms(self.clock.now_ms(), start) >= timeout_ms {
                break;
            }
            self.clock.delay_ms(POLL_STEP_MS);
        }
        let response = String::from_utf8_lossy(&buf).into_owned();
        log::debug!("{cmd} -> {:?}", response);
        response
    }

    /// Drain whatever is buffered right now without sending anything
    pub fn drain(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        while self.transport.available() {
            match self.transport.read_byte() {
                Some(b) => buf.push(b),
                None => break,
            }
        }
        buf
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Underlying clock
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Underlying clock, mutably
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}
