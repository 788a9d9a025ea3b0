//! Message transports for WLED controllers.
//!
//! A [`WledTransport`] opens links; a [`WledLink`] carries newline-framed
//! JSON messages over an open connection. The session layer never touches
//! sockets directly, so tests substitute [`SimulatedTransport`].

use fcs_common::{FcsError, FcsResult};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// An open connection to one controller.
pub trait WledLink {
    /// Send one message.
    fn send(&mut self, payload: &str) -> FcsResult<()>;
    /// Drain any inbound messages without blocking.
    fn drain(&mut self) -> Vec<String>;
}

/// Connection factory for controller links.
pub trait WledTransport {
    /// Link type produced by this transport.
    type Link: WledLink;

    /// Open a connection to `address`.
    fn connect(&self, address: &str) -> FcsResult<Self::Link>;
}

/// TCP link framing messages with a trailing newline.
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
    rx_buffer: Vec<u8>,
}

impl WledLink for TcpLink {
    fn send(&mut self, payload: &str) -> FcsResult<()> {
        self.stream
            .write_all(payload.as_bytes())
            .and_then(|()| self.stream.write_all(b"\n"))
            .map_err(|e| FcsError::Transport(format!("send failed: {e}")))
    }

    fn drain(&mut self) -> Vec<String> {
        let mut chunk = [0u8; 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break, // peer closed; keepalive will notice
                Ok(n) => self.rx_buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "read failed while draining");
                    break;
                }
            }
        }

        let mut messages = Vec::new();
        while let Some(pos) = self.rx_buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.rx_buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim();
            if !text.is_empty() {
                messages.push(text.to_owned());
            }
        }
        messages
    }
}

/// Transport opening non-blocking TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl WledTransport for TcpTransport {
    type Link = TcpLink;

    fn connect(&self, address: &str) -> FcsResult<TcpLink> {
        let socket_addr = address
            .parse()
            .map_err(|e| FcsError::Config(format!("invalid WLED address {address:?}: {e}")))?;
        let stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
            .map_err(|e| FcsError::Transport(format!("connection failed: {e}")))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| FcsError::Transport(format!("failed to set non-blocking: {e}")))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %address, error = %e, "failed to set TCP_NODELAY");
        }
        Ok(TcpLink {
            stream,
            rx_buffer: Vec::new(),
        })
    }
}

/// Shared state behind a [`SimulatedTransport`] and its links.
#[derive(Debug, Default)]
pub struct SimulatedState {
    /// Connect calls, in order of attempted address.
    pub connect_attempts: Vec<String>,
    /// Every payload sent on any link, in order.
    pub sent: Vec<String>,
    /// One inbound queue per opened link.
    queues: Vec<Rc<RefCell<VecDeque<String>>>>,
    /// When true, connect calls fail.
    pub fail_connect: bool,
    /// When true, sends fail.
    pub fail_sends: bool,
}

/// In-memory transport; clones share one [`SimulatedState`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    state: Rc<RefCell<SimulatedState>>,
}

impl SimulatedTransport {
    /// Fresh transport with no scripted behavior.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the shared state for scripting and assertions.
    #[must_use]
    pub fn state(&self) -> Rc<RefCell<SimulatedState>> {
        Rc::clone(&self.state)
    }

    /// Queue a message every open link will see on its next drain.
    pub fn push_inbound(&self, message: &str) {
        for queue in &self.state.borrow().queues {
            queue.borrow_mut().push_back(message.to_owned());
        }
    }

    /// Payloads sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.state.borrow().sent.clone()
    }

    /// Number of connect calls so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.borrow().connect_attempts.len()
    }
}

/// Link produced by [`SimulatedTransport`].
#[derive(Debug)]
pub struct SimulatedLink {
    state: Rc<RefCell<SimulatedState>>,
    inbound: Rc<RefCell<VecDeque<String>>>,
}

impl WledLink for SimulatedLink {
    fn send(&mut self, payload: &str) -> FcsResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_sends {
            return Err(FcsError::Transport("simulated send failure".into()));
        }
        state.sent.push(payload.to_owned());
        Ok(())
    }

    fn drain(&mut self) -> Vec<String> {
        self.inbound.borrow_mut().drain(..).collect()
    }
}

impl WledTransport for SimulatedTransport {
    type Link = SimulatedLink;

    fn connect(&self, address: &str) -> FcsResult<SimulatedLink> {
        let mut state = self.state.borrow_mut();
        state.connect_attempts.push(address.to_owned());
        if state.fail_connect {
            return Err(FcsError::Transport("simulated connect failure".into()));
        }
        let inbound = Rc::new(RefCell::new(VecDeque::new()));
        state.queues.push(Rc::clone(&inbound));
        drop(state);
        Ok(SimulatedLink {
            state: Rc::clone(&self.state),
            inbound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_link_records_sends() {
        let transport = SimulatedTransport::new();
        let mut link = transport.connect("10.0.100.60:2801").unwrap();
        link.send("{}").unwrap();
        link.send("{\"on\":true}").unwrap();
        assert_eq!(transport.sent(), vec!["{}", "{\"on\":true}"]);
        assert_eq!(transport.connect_count(), 1);
    }

    #[test]
    fn test_simulated_link_drains_inbound_once() {
        let transport = SimulatedTransport::new();
        let mut link = transport.connect("10.0.100.60:2801").unwrap();
        transport.push_inbound("{\"state\":{}}");
        assert_eq!(link.drain().len(), 1);
        assert!(link.drain().is_empty());
    }

    #[test]
    fn test_simulated_connect_failure() {
        let transport = SimulatedTransport::new();
        transport.state().borrow_mut().fail_connect = true;
        assert!(transport.connect("10.0.100.60:2801").is_err());
        assert_eq!(transport.connect_count(), 1);
    }

    #[test]
    fn test_tcp_transport_rejects_bad_address() {
        let err = TcpTransport.connect("not an address").unwrap_err();
        assert!(matches!(err, FcsError::Config(_)));
    }
}
