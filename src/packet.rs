use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::{BLOCK_SIZE, MAX_PACKET_SIZE};

const OPCODE_RRQ: u16 = 1;
const OPCODE_WRQ: u16 = 2;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;

// opcode + the fixed fields of each packet kind; requests need two terminators
const MIN_REQUEST_LEN: usize = 4;
const MIN_DATA_LEN: usize = 4;
const MIN_ACK_LEN: usize = 4;
const MIN_ERROR_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TftpPacket {
    RRQ { filename: String, mode: String },
    WRQ { filename: String, mode: String },
    DATA { block: u16, data: Vec<u8> },
    ACK(u16),
    ERROR { code: u16, msg: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{0} contains a NUL byte")]
    InteriorNul(&'static str),
    #[error("data payload of {0} bytes exceeds the 512-byte block size")]
    PayloadTooLarge(usize),
    #[error("encoded packet of {0} bytes exceeds the 516-byte datagram limit")]
    TooLong(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet is shorter than its header")]
    Truncated,
    #[error("invalid opcode: {0}")]
    UnknownOpcode(u16),
    #[error("request filename and mode are not both NUL-terminated")]
    MalformedStrings,
}

impl TftpPacket {
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut bytes: Vec<u8> = Vec::with_capacity(MAX_PACKET_SIZE);

        match self {
            TftpPacket::RRQ { filename, mode } | TftpPacket::WRQ { filename, mode } => {
                let opcode = if let TftpPacket::RRQ { .. } = self {
                    OPCODE_RRQ
                } else {
                    OPCODE_WRQ
                };
                bytes.extend_from_slice(&opcode.to_be_bytes());
                write_cstr(&mut bytes, "filename", filename)?;
                write_cstr(&mut bytes, "mode", mode)?;
            }
            TftpPacket::DATA { block, data } => {
                if data.len() > BLOCK_SIZE {
                    return Err(EncodeError::PayloadTooLarge(data.len()));
                }
                bytes.extend_from_slice(&OPCODE_DATA.to_be_bytes());
                bytes.extend_from_slice(&block.to_be_bytes());
                bytes.extend_from_slice(data);
            }
            TftpPacket::ACK(block) => {
                bytes.extend_from_slice(&OPCODE_ACK.to_be_bytes());
                bytes.extend_from_slice(&block.to_be_bytes());
            }
            TftpPacket::ERROR { code, msg } => {
                bytes.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
                bytes.extend_from_slice(&code.to_be_bytes());
                write_cstr(&mut bytes, "error message", msg)?;
            }
        }

        if bytes.len() > MAX_PACKET_SIZE {
            return Err(EncodeError::TooLong(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < 2 {
            return Err(DecodeError::Truncated);
        }

        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let min_len = match opcode {
            OPCODE_RRQ | OPCODE_WRQ => MIN_REQUEST_LEN,
            OPCODE_DATA => MIN_DATA_LEN,
            OPCODE_ACK => MIN_ACK_LEN,
            OPCODE_ERROR => MIN_ERROR_LEN,
            _ => return Err(DecodeError::UnknownOpcode(opcode)),
        };
        if buf.len() < min_len {
            return Err(DecodeError::Truncated);
        }

        let pkt = match opcode {
            OPCODE_RRQ | OPCODE_WRQ => {
                let (filename, rest) = read_cstr(&buf[2..]).ok_or(DecodeError::MalformedStrings)?;
                // anything after the mode would be RFC 2347 options, which are not negotiated
                let (mode, _) = read_cstr(rest).ok_or(DecodeError::MalformedStrings)?;
                if opcode == OPCODE_RRQ {
                    TftpPacket::RRQ { filename, mode }
                } else {
                    TftpPacket::WRQ { filename, mode }
                }
            }
            OPCODE_DATA => TftpPacket::DATA {
                block: u16::from_be_bytes([buf[2], buf[3]]),
                data: buf[4..].to_vec(),
            },
            OPCODE_ACK => TftpPacket::ACK(u16::from_be_bytes([buf[2], buf[3]])),
            _ => {
                let code = u16::from_be_bytes([buf[2], buf[3]]);
                // Some servers omit the terminator; take the rest of the datagram then.
                let msg = match read_cstr(&buf[4..]) {
                    Some((msg, _)) => msg,
                    None => String::from_utf8_lossy(&buf[4..]).into_owned(),
                };
                TftpPacket::ERROR { code, msg }
            }
        };

        Ok(pkt)
    }

    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        TftpPacket::ERROR {
            code: code.code(),
            msg: msg.into(),
        }
    }
}

impl fmt::Display for TftpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TftpPacket::RRQ { filename, mode } => write!(f, "RRQ {filename:?} ({mode})"),
            TftpPacket::WRQ { filename, mode } => write!(f, "WRQ {filename:?} ({mode})"),
            TftpPacket::DATA { block, data } => write!(f, "DATA #{block} ({} bytes)", data.len()),
            TftpPacket::ACK(block) => write!(f, "ACK #{block}"),
            TftpPacket::ERROR { code, msg } => write!(f, "ERROR {code}: {msg}"),
        }
    }
}

fn write_cstr(bytes: &mut Vec<u8>, field: &'static str, s: &str) -> Result<(), EncodeError> {
    if s.as_bytes().contains(&0) {
        return Err(EncodeError::InteriorNul(field));
    }
    if s.len() > MAX_PACKET_SIZE {
        return Err(EncodeError::TooLong(s.len()));
    }
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    Ok(())
}

// 读取以 \0 结尾的 C 风格字符串, 返回字符串和剩余部分
fn read_cstr(buf: &[u8]) -> Option<(String, &[u8])> {
    let pos = buf.iter().position(|&b| b == 0)?;
    let s = String::from_utf8_lossy(&buf[..pos]).into_owned();
    Some((s, &buf[pos + 1..]))
}

/// The error codes defined by RFC 1350.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileAlreadyExists,
    NoSuchUser,
}

impl ErrorCode {
    pub fn from_code(code: u16) -> Option<Self> {
        let code = match code {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            _ => return None,
        };
        Some(code)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NotDefined => "Undef",
            ErrorCode::FileNotFound => "File not found",
            ErrorCode::AccessViolation => "Access violation",
            ErrorCode::DiskFull => "Disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "Illegal TFTP operation",
            ErrorCode::UnknownTransferId => "Unknown transfer ID",
            ErrorCode::FileAlreadyExists => "File already exists",
            ErrorCode::NoSuchUser => "No such user",
        }
    }
}

/// Transfer mode named in a request.
///
/// The mode string is sent as-is; file contents are always moved byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Netascii,
    #[default]
    Octet,
    Mail,
}

#[derive(Debug, Error)]
#[error("unknown transfer mode '{0}', expected netascii, octet or mail")]
pub struct UnknownMode(String);

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Netascii => "netascii",
            Mode::Octet => "octet",
            Mode::Mail => "mail",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Ok(Mode::Netascii),
            "octet" => Ok(Mode::Octet),
            "mail" => Ok(Mode::Mail),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrq_wire_layout() {
        let pkt = TftpPacket::RRQ {
            filename: "boot.img".into(),
            mode: "octet".into(),
        };
        assert_eq!(pkt.serialize().unwrap(), b"\x00\x01boot.img\x00octet\x00".to_vec());
    }

    #[test]
    fn wrq_wire_layout() {
        let pkt = TftpPacket::WRQ {
            filename: "a".into(),
            mode: "netascii".into(),
        };
        assert_eq!(pkt.serialize().unwrap(), b"\x00\x02a\x00netascii\x00".to_vec());
    }

    #[test]
    fn data_ack_error_wire_layout() {
        let data = TftpPacket::DATA {
            block: 0x0102,
            data: b"xyz".to_vec(),
        };
        assert_eq!(data.serialize().unwrap(), b"\x00\x03\x01\x02xyz".to_vec());

        assert_eq!(
            TftpPacket::ACK(65535).serialize().unwrap(),
            vec![0x00, 0x04, 0xff, 0xff]
        );

        let err = TftpPacket::error(ErrorCode::FileNotFound, "File not found");
        assert_eq!(
            err.serialize().unwrap(),
            b"\x00\x05\x00\x01File not found\x00".to_vec()
        );
    }

    #[test]
    fn roundtrip_each_kind() {
        let packets = [
            TftpPacket::RRQ {
                filename: "dir/file.bin".into(),
                mode: "octet".into(),
            },
            TftpPacket::WRQ {
                filename: "upload.txt".into(),
                mode: "mail".into(),
            },
            TftpPacket::DATA {
                block: 7,
                data: vec![0xAB; BLOCK_SIZE],
            },
            TftpPacket::DATA {
                block: 0,
                data: Vec::new(),
            },
            TftpPacket::ACK(0),
            TftpPacket::ERROR {
                code: 2,
                msg: String::new(),
            },
        ];
        for pkt in packets {
            let bytes = pkt.serialize().unwrap();
            assert_eq!(TftpPacket::deserialize(&bytes).unwrap(), pkt);
        }
    }

    #[test]
    fn roundtrip_at_boundaries() {
        let mut packets = vec![
            TftpPacket::RRQ {
                filename: String::new(),
                mode: String::new(),
            },
            TftpPacket::WRQ {
                filename: "x".into(),
                mode: String::new(),
            },
            // 2 + 506 + 1 + 5 + 1 fills the datagram exactly
            TftpPacket::RRQ {
                filename: "n".repeat(506),
                mode: "octet".into(),
            },
            TftpPacket::ACK(65535),
            TftpPacket::ERROR {
                code: 65535,
                msg: "e".repeat(MAX_PACKET_SIZE - 5),
            },
        ];
        for len in [1, BLOCK_SIZE - 1, BLOCK_SIZE] {
            for block in [0, 1, 65535] {
                packets.push(TftpPacket::DATA {
                    block,
                    data: (0..len).map(|i| i as u8).collect(),
                });
            }
        }

        for pkt in packets {
            let bytes = pkt.serialize().unwrap();
            assert!(bytes.len() <= MAX_PACKET_SIZE);
            assert_eq!(TftpPacket::deserialize(&bytes).unwrap(), pkt);
        }

        let over = TftpPacket::ERROR {
            code: 0,
            msg: "e".repeat(MAX_PACKET_SIZE - 4),
        };
        assert_eq!(over.serialize(), Err(EncodeError::TooLong(MAX_PACKET_SIZE + 1)));
    }

    #[test]
    fn serialize_rejects_nul_in_strings() {
        let pkt = TftpPacket::RRQ {
            filename: "bad\0name".into(),
            mode: "octet".into(),
        };
        assert_eq!(pkt.serialize(), Err(EncodeError::InteriorNul("filename")));

        let pkt = TftpPacket::ERROR {
            code: 0,
            msg: "oops\0".into(),
        };
        assert_eq!(pkt.serialize(), Err(EncodeError::InteriorNul("error message")));
    }

    #[test]
    fn serialize_rejects_oversized_payload() {
        let pkt = TftpPacket::DATA {
            block: 1,
            data: vec![0; BLOCK_SIZE + 1],
        };
        assert_eq!(pkt.serialize(), Err(EncodeError::PayloadTooLarge(BLOCK_SIZE + 1)));
    }

    #[test]
    fn serialize_rejects_overlong_request() {
        let pkt = TftpPacket::WRQ {
            filename: "f".repeat(510),
            mode: "octet".into(),
        };
        assert!(matches!(pkt.serialize(), Err(EncodeError::TooLong(_))));
    }

    #[test]
    fn deserialize_short_buffers_are_truncated() {
        assert_eq!(TftpPacket::deserialize(&[]), Err(DecodeError::Truncated));
        assert_eq!(TftpPacket::deserialize(&[0]), Err(DecodeError::Truncated));
        for opcode in 1u8..=5 {
            for len in 2..4 {
                let mut buf = vec![0u8; len];
                buf[1] = opcode;
                assert_eq!(
                    TftpPacket::deserialize(&buf),
                    Err(DecodeError::Truncated),
                    "opcode {opcode} len {len}"
                );
            }
        }
    }

    #[test]
    fn deserialize_unknown_opcode() {
        assert_eq!(
            TftpPacket::deserialize(&[0, 6, 0, 0]),
            Err(DecodeError::UnknownOpcode(6))
        );
        assert_eq!(
            TftpPacket::deserialize(&[0, 0]),
            Err(DecodeError::UnknownOpcode(0))
        );
    }

    #[test]
    fn deserialize_request_missing_terminator() {
        assert_eq!(
            TftpPacket::deserialize(b"\x00\x01file\x00octet"),
            Err(DecodeError::MalformedStrings)
        );
        assert_eq!(
            TftpPacket::deserialize(b"\x00\x02filename"),
            Err(DecodeError::MalformedStrings)
        );
    }

    #[test]
    fn deserialize_error_without_terminator() {
        let pkt = TftpPacket::deserialize(b"\x00\x05\x00\x03disk full").unwrap();
        assert_eq!(
            pkt,
            TftpPacket::ERROR {
                code: 3,
                msg: "disk full".into()
            }
        );
    }

    #[test]
    fn error_code_descriptions() {
        assert_eq!(ErrorCode::from_code(1), Some(ErrorCode::FileNotFound));
        assert_eq!(ErrorCode::from_code(8), None);
        assert_eq!(ErrorCode::UnknownTransferId.code(), 5);
        assert_eq!(ErrorCode::DiskFull.description(), "Disk full or allocation exceeded");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("OCTET".parse::<Mode>().unwrap(), Mode::Octet);
        assert_eq!("netascii".parse::<Mode>().unwrap(), Mode::Netascii);
        assert!("binary".parse::<Mode>().is_err());
        assert_eq!(Mode::default().to_string(), "octet");
    }
}
