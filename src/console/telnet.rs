//! Minimal telnet option handling for the serial console
//!
//! QEMU's telnet server interleaves command sequences with terminal output.
//! `TelnetDecoder` strips them from the byte stream and produces the replies
//! a client that supports no options should send back.

/// Interpret As Command
pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
/// Subnegotiation begin
pub const SB: u8 = 250;
/// Subnegotiation end
pub const SE: u8 = 240;

/// Echo option (RFC 857)
pub const ECHO: u8 = 1;

/// Sequence sent right after connecting to stop the remote end echoing
/// typed input back at us
pub const WILL_ECHO: [u8; 3] = [IAC, WILL, ECHO];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    /// Previous data byte was `\r`; a following NUL is padding
    Cr,
    Iac,
    /// Waiting for the option byte of DO/DONT/WILL/WONT
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Output of one `decode` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Terminal data with telnet commands removed
    pub data: Vec<u8>,
    /// Negotiation replies to write back to the server
    pub replies: Vec<u8>,
}

/// Incremental telnet stream decoder
///
/// State carries over between calls, so a command split across two socket
/// reads is still recognised.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: State,
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, input: &[u8]) -> Decoded {
        let mut out = Decoded::default();

        for &byte in input {
            match self.state {
                State::Data => self.data_byte(byte, &mut out),
                State::Cr => {
                    self.state = State::Data;
                    if byte != 0 {
                        self.data_byte(byte, &mut out);
                    }
                }
                State::Iac => {
                    self.state = match byte {
                        IAC => {
                            out.data.push(IAC);
                            State::Data
                        }
                        DO | DONT | WILL | WONT => State::Negotiate(byte),
                        SB => State::Sub,
                        // NOP, GA, AYT and friends carry no payload
                        _ => State::Data,
                    };
                }
                State::Negotiate(command) => {
                    self.state = State::Data;
                    if let Some(reply) = refuse(command, byte) {
                        out.replies.extend_from_slice(&[IAC, reply, byte]);
                    }
                }
                State::Sub => {
                    if byte == IAC {
                        self.state = State::SubIac;
                    }
                }
                State::SubIac => {
                    self.state = if byte == SE { State::Data } else { State::Sub };
                }
            }
        }

        out
    }

    fn data_byte(&mut self, byte: u8, out: &mut Decoded) {
        match byte {
            IAC => self.state = State::Iac,
            b'\r' => {
                out.data.push(byte);
                self.state = State::Cr;
            }
            _ => out.data.push(byte),
        }
    }
}

/// Reply to a negotiation request: we enable nothing on either side, except
/// that a DO/DONT for the echo option we offered ourselves needs no answer
fn refuse(command: u8, option: u8) -> Option<u8> {
    match command {
        WILL => Some(DONT),
        DO if option == ECHO => None,
        DO => Some(WONT),
        _ => None,
    }
}
