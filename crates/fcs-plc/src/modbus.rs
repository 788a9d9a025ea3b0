//! Modbus TCP client used to talk to the field PLC.
//!
//! Implements exactly the operations the supervisor needs:
//! - Read Discrete Inputs (0x02)
//! - Read Holding Registers (0x03)
//! - Write Single Coil (0x05)
//! - Write Multiple Coils (0x0F)

use fcs_common::{FcsError, FcsResult};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::{info, trace, warn};

/// Standard Modbus TCP port.
pub const MODBUS_PORT: u16 = 502;

/// Unit id of the field PLC.
pub const SLAVE_ID: u8 = 1;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Modbus function codes used by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Discrete Inputs (0x02).
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03).
    ReadHoldingRegisters = 0x03,
    /// Write Single Coil (0x05).
    WriteSingleCoil = 0x05,
    /// Write Multiple Coils (0x0F).
    WriteMultipleCoils = 0x0F,
}

/// Connection-oriented Modbus client operations.
///
/// The supervisor is generic over this trait so tests can substitute
/// [`SimulatedModbus`].
pub trait ModbusClient {
    /// Open a TCP connection to `host` on the Modbus port.
    fn connect(&mut self, host: &str) -> FcsResult<()>;
    /// True while a connection is believed open.
    fn is_open(&self) -> bool;
    /// Set the unit id used in subsequent requests.
    fn set_slave_id(&mut self, id: u8);
    /// Read `count` holding registers starting at `start`.
    fn read_holding_registers(&mut self, start: u16, count: u16) -> FcsResult<Vec<u16>>;
    /// Read `count` discrete inputs starting at `start`.
    fn read_discrete_inputs(&mut self, start: u16, count: u16) -> FcsResult<Vec<bool>>;
    /// Write one coil.
    fn write_coil(&mut self, index: u16, value: bool) -> FcsResult<()>;
    /// Write a contiguous run of coils starting at `start`.
    fn write_coils(&mut self, start: u16, values: &[bool]) -> FcsResult<()>;
    /// Drop the connection.
    fn close(&mut self);
}

/// Modbus TCP Application Protocol (MBAP) header.
#[derive(Debug, Clone, Copy)]
struct MbapHeader {
    transaction_id: u16,
    protocol_id: u16,
    length: u16,
    unit_id: u8,
}

impl MbapHeader {
    const SIZE: usize = 7;

    fn new(transaction_id: u16, pdu_length: u16, unit_id: u8) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: pdu_length + 1, // +1 for unit_id
            unit_id,
        }
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id;
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> FcsResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(FcsError::Protocol(format!(
                "MBAP header too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }
}

fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Server Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Server Device Busy",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Failed",
        _ => "Unknown",
    }
}

/// Modbus TCP client over a blocking stream with short I/O timeouts.
pub struct ModbusTcp {
    connection: Option<TcpStream>,
    unit_id: u8,
    transaction_id: u16,
    rx_buffer: Vec<u8>,
}

impl ModbusTcp {
    /// Create a disconnected client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connection: None,
            unit_id: SLAVE_ID,
            transaction_id: 0,
            rx_buffer: vec![0u8; 260], // Max Modbus TCP frame size
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Send one request PDU and return the response PDU.
    ///
    /// Any I/O failure drops the connection so the caller's reconnect path
    /// takes over on the next poll.
    fn exchange(&mut self, pdu: &[u8]) -> FcsResult<Vec<u8>> {
        if self.connection.is_none() {
            return Err(FcsError::Transport("not connected".into()));
        }

        let transaction_id = self.next_transaction_id();
        let header = MbapHeader::new(transaction_id, pdu.len() as u16, self.unit_id);

        let mut request = Vec::with_capacity(MbapHeader::SIZE + pdu.len());
        request.extend_from_slice(&header.to_bytes());
        request.extend_from_slice(pdu);

        trace!(transaction_id, pdu_len = pdu.len(), "sending Modbus request");

        if let Some(stream) = self.connection.as_mut() {
            if let Err(e) = stream.write_all(&request) {
                self.connection = None;
                return Err(FcsError::Transport(format!("send failed: {e}")));
            }
        }

        {
            let stream = self
                .connection
                .as_mut()
                .ok_or_else(|| FcsError::Transport("connection lost during send".into()))?;
            let header_buf = &mut self.rx_buffer[..MbapHeader::SIZE];
            if let Err(e) = stream.read_exact(header_buf) {
                self.connection = None;
                return Err(FcsError::Transport(format!("receive header failed: {e}")));
            }
        }

        let response_header = MbapHeader::from_bytes(&self.rx_buffer[..MbapHeader::SIZE])?;

        if response_header.transaction_id != transaction_id {
            return Err(FcsError::Protocol(format!(
                "transaction id mismatch: expected {}, got {}",
                transaction_id, response_header.transaction_id
            )));
        }
        if response_header.protocol_id != 0 {
            return Err(FcsError::Protocol(format!(
                "invalid protocol id: {}",
                response_header.protocol_id
            )));
        }
        if response_header.unit_id != self.unit_id {
            return Err(FcsError::Protocol(format!(
                "unit id mismatch: expected {}, got {}",
                self.unit_id, response_header.unit_id
            )));
        }

        let pdu_length = (response_header.length - 1) as usize; // -1 for unit_id
        if pdu_length > self.rx_buffer.len() - MbapHeader::SIZE {
            return Err(FcsError::Protocol(format!(
                "response too large: {pdu_length} bytes"
            )));
        }

        {
            let stream = self
                .connection
                .as_mut()
                .ok_or_else(|| FcsError::Transport("connection lost during receive".into()))?;
            let pdu_buf = &mut self.rx_buffer[MbapHeader::SIZE..MbapHeader::SIZE + pdu_length];
            if let Err(e) = stream.read_exact(pdu_buf) {
                self.connection = None;
                return Err(FcsError::Transport(format!("receive PDU failed: {e}")));
            }
        }

        // Exception response: function code with the high bit set.
        let pdu_buf = &self.rx_buffer[MbapHeader::SIZE..MbapHeader::SIZE + pdu_length];
        if !pdu_buf.is_empty() && (pdu_buf[0] & 0x80) != 0 {
            let name = if pdu_buf.len() > 1 {
                exception_name(pdu_buf[1])
            } else {
                "Unknown"
            };
            return Err(FcsError::Protocol(format!("Modbus exception: {name}")));
        }

        Ok(pdu_buf.to_vec())
    }

    fn check_function_code(response: &[u8], function: FunctionCode) -> FcsResult<()> {
        if response.len() < 2 {
            return Err(FcsError::Protocol("response too short".into()));
        }
        if response[0] != function as u8 {
            return Err(FcsError::Protocol(format!(
                "function code mismatch: expected 0x{:02X}, got 0x{:02X}",
                function as u8, response[0]
            )));
        }
        Ok(())
    }
}

impl Default for ModbusTcp {
    fn default() -> Self {
        Self::new()
    }
}

impl ModbusClient for ModbusTcp {
    fn connect(&mut self, host: &str) -> FcsResult<()> {
        let addr = if host.contains(':') {
            host.to_owned()
        } else {
            format!("{host}:{MODBUS_PORT}")
        };

        info!(addr = %addr, "connecting to Modbus TCP server");

        let socket_addr = addr
            .parse()
            .map_err(|e| FcsError::Config(format!("invalid PLC address {addr:?}: {e}")))?;
        let stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
            .map_err(|e| FcsError::Transport(format!("connection failed: {e}")))?;

        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .map_err(|e| FcsError::Transport(format!("failed to set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(IO_TIMEOUT))
            .map_err(|e| FcsError::Transport(format!("failed to set write timeout: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| FcsError::Transport(format!("failed to set TCP_NODELAY: {e}")))?;

        self.connection = Some(stream);
        info!("connected to Modbus TCP server");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn set_slave_id(&mut self, id: u8) {
        self.unit_id = id;
    }

    fn read_holding_registers(&mut self, start: u16, count: u16) -> FcsResult<Vec<u16>> {
        let pdu = [
            FunctionCode::ReadHoldingRegisters as u8,
            (start >> 8) as u8,
            (start & 0xFF) as u8,
            (count >> 8) as u8,
            (count & 0xFF) as u8,
        ];
        let response = self.exchange(&pdu)?;
        Self::check_function_code(&response, FunctionCode::ReadHoldingRegisters)?;

        let byte_count = response[1] as usize;
        if byte_count != count as usize * 2 || response.len() < 2 + byte_count {
            return Err(FcsError::Protocol(format!(
                "expected {} register bytes, got {}",
                count as usize * 2,
                byte_count
            )));
        }

        let mut registers = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let offset = 2 + i * 2;
            registers.push(u16::from_be_bytes([response[offset], response[offset + 1]]));
        }
        Ok(registers)
    }

    fn read_discrete_inputs(&mut self, start: u16, count: u16) -> FcsResult<Vec<bool>> {
        let pdu = [
            FunctionCode::ReadDiscreteInputs as u8,
            (start >> 8) as u8,
            (start & 0xFF) as u8,
            (count >> 8) as u8,
            (count & 0xFF) as u8,
        ];
        let response = self.exchange(&pdu)?;
        Self::check_function_code(&response, FunctionCode::ReadDiscreteInputs)?;

        let byte_count = response[1] as usize;
        let expected_bytes = (count as usize + 7) / 8;
        if byte_count < expected_bytes || response.len() < 2 + byte_count {
            return Err(FcsError::Protocol(format!(
                "expected at least {expected_bytes} bytes for {count} bits, got {byte_count}"
            )));
        }

        let mut bits = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            bits.push((response[2 + i / 8] >> (i % 8)) & 1 != 0);
        }
        Ok(bits)
    }

    fn write_coil(&mut self, index: u16, value: bool) -> FcsResult<()> {
        let coil_value: u16 = if value { 0xFF00 } else { 0x0000 };
        let pdu = [
            FunctionCode::WriteSingleCoil as u8,
            (index >> 8) as u8,
            (index & 0xFF) as u8,
            (coil_value >> 8) as u8,
            (coil_value & 0xFF) as u8,
        ];
        let response = self.exchange(&pdu)?;

        // Response echoes the request exactly.
        if response.len() < 5 {
            return Err(FcsError::Protocol("response too short".into()));
        }
        Self::check_function_code(&response, FunctionCode::WriteSingleCoil)?;

        let resp_address = u16::from_be_bytes([response[1], response[2]]);
        let resp_value = u16::from_be_bytes([response[3], response[4]]);
        if resp_address != index || resp_value != coil_value {
            return Err(FcsError::Protocol(format!(
                "write coil echo mismatch: addr={resp_address}/{index}, value=0x{resp_value:04X}"
            )));
        }
        Ok(())
    }

    fn write_coils(&mut self, start: u16, values: &[bool]) -> FcsResult<()> {
        if values.is_empty() {
            return Err(FcsError::Protocol("cannot write zero coils".into()));
        }
        if values.len() == 1 {
            return self.write_coil(start, values[0]);
        }

        let quantity = values.len() as u16;
        let byte_count = (values.len() + 7) / 8;

        let mut data_bytes = vec![0u8; byte_count];
        for (i, &value) in values.iter().enumerate() {
            if value {
                data_bytes[i / 8] |= 1 << (i % 8);
            }
        }

        let mut pdu = Vec::with_capacity(6 + byte_count);
        pdu.push(FunctionCode::WriteMultipleCoils as u8);
        pdu.extend_from_slice(&start.to_be_bytes());
        pdu.extend_from_slice(&quantity.to_be_bytes());
        pdu.push(byte_count as u8);
        pdu.extend_from_slice(&data_bytes);

        let response = self.exchange(&pdu)?;

        if response.len() < 5 {
            return Err(FcsError::Protocol("response too short".into()));
        }
        Self::check_function_code(&response, FunctionCode::WriteMultipleCoils)?;

        let resp_address = u16::from_be_bytes([response[1], response[2]]);
        let resp_quantity = u16::from_be_bytes([response[3], response[4]]);
        if resp_address != start || resp_quantity != quantity {
            return Err(FcsError::Protocol(format!(
                "write coils response mismatch: addr={resp_address}/{start}, qty={resp_quantity}/{quantity}"
            )));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            warn!("closing Modbus TCP connection");
        }
    }
}

/// Recorded coil write, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoilWrite {
    /// Single-coil write (function 0x05).
    Single {
        /// Coil index.
        index: u16,
        /// Written value.
        value: bool,
    },
    /// Multiple-coil write (function 0x0F).
    Multiple {
        /// Starting coil index.
        start: u16,
        /// Written values.
        values: Vec<bool>,
    },
}

/// In-memory Modbus double with scripted reads and recorded writes.
#[derive(Debug, Default)]
pub struct SimulatedModbus {
    open: bool,
    /// Unit id last set by the supervisor.
    pub slave_id: u8,
    /// Discrete input bits returned by reads.
    pub inputs: Vec<bool>,
    /// Holding register values returned by reads.
    pub registers: Vec<u16>,
    /// Every coil write, in order.
    pub writes: Vec<CoilWrite>,
    /// Number of connect calls.
    pub connect_attempts: u32,
    /// When true, connect calls fail.
    pub fail_connect: bool,
    /// When true, reads fail.
    pub fail_reads: bool,
    /// When true, writes fail.
    pub fail_writes: bool,
}

impl SimulatedModbus {
    /// Healthy PLC double with all inputs false and zeroed registers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![false; crate::INPUT_COUNT as usize],
            registers: vec![0; crate::REGISTER_COUNT as usize],
            ..Self::default()
        }
    }

    /// The coil image implied by the most recent multiple-coil write.
    #[must_use]
    pub fn last_full_write(&self) -> Option<&[bool]> {
        self.writes.iter().rev().find_map(|w| match w {
            CoilWrite::Multiple { values, .. } => Some(values.as_slice()),
            CoilWrite::Single { .. } => None,
        })
    }
}

impl ModbusClient for SimulatedModbus {
    fn connect(&mut self, _host: &str) -> FcsResult<()> {
        self.connect_attempts += 1;
        if self.fail_connect {
            return Err(FcsError::Transport("simulated connect failure".into()));
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_slave_id(&mut self, id: u8) {
        self.slave_id = id;
    }

    fn read_holding_registers(&mut self, start: u16, count: u16) -> FcsResult<Vec<u16>> {
        if self.fail_reads {
            return Err(FcsError::Transport("simulated read failure".into()));
        }
        let start = start as usize;
        let end = (start + count as usize).min(self.registers.len());
        Ok(self.registers[start..end].to_vec())
    }

    fn read_discrete_inputs(&mut self, start: u16, count: u16) -> FcsResult<Vec<bool>> {
        if self.fail_reads {
            return Err(FcsError::Transport("simulated read failure".into()));
        }
        let start = start as usize;
        let end = (start + count as usize).min(self.inputs.len());
        Ok(self.inputs[start..end].to_vec())
    }

    fn write_coil(&mut self, index: u16, value: bool) -> FcsResult<()> {
        if self.fail_writes {
            return Err(FcsError::Transport("simulated write failure".into()));
        }
        self.writes.push(CoilWrite::Single { index, value });
        Ok(())
    }

    fn write_coils(&mut self, start: u16, values: &[bool]) -> FcsResult<()> {
        if self.fail_writes {
            return Err(FcsError::Transport("simulated write failure".into()));
        }
        self.writes.push(CoilWrite::Multiple {
            start,
            values: values.to_vec(),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
