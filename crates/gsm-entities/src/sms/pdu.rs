//! Decoder for inbound SMS-DELIVER PDUs (3GPP TS 23.040), hex encoded as the modem reports them

use core::fmt;

use super::alphabet::{self, Alphabet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduDecodeErr {
    InvalidHex,
    Truncated { field: &'static str },
    /// Message type indicator other than SMS-DELIVER
    NotDeliver(u8),
    UnsupportedDcs(u8),
}

impl fmt::Display for PduDecodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PduDecodeErr::InvalidHex => write!(f, "invalid hex"),
            PduDecodeErr::Truncated { field } => write!(f, "pdu truncated in {}", field),
            PduDecodeErr::NotDeliver(mti) => write!(f, "not an SMS-DELIVER (mti {})", mti),
            PduDecodeErr::UnsupportedDcs(dcs) => write!(f, "unsupported data coding scheme {:#04x}", dcs),
        }
    }
}

impl std::error::Error for PduDecodeErr {}

/// User data encoding as given by the data coding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDataCoding {
    Text(Alphabet),
    Octets,
}

/// Concatenation info from the user data header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatInfo {
    pub reference: u16,
    pub total: u8,
    pub seq: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverPdu {
    pub smsc: String,
    pub originator: String,
    /// Service centre timestamp as "yy/MM/dd,hh:mm:ss+zz" (zz in quarter hours)
    pub timestamp: String,
    pub coding: UserDataCoding,
    pub concat: Option<ConcatInfo>,
    pub text: String,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self, field: &'static str) -> Result<u8, PduDecodeErr> {
        let v = *self.buf.get(self.pos).ok_or(PduDecodeErr::Truncated { field })?;
        self.pos += 1;
        Ok(v)
    }

    fn bytes(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], PduDecodeErr> {
        let end = self.pos + n;
        let s = self.buf.get(self.pos..end).ok_or(PduDecodeErr::Truncated { field })?;
        self.pos = end;
        Ok(s)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }
}

fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, PduDecodeErr> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(PduDecodeErr::InvalidHex);
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|b| u8::from_str_radix(b, 16).ok())
                .ok_or(PduDecodeErr::InvalidHex)
        })
        .collect()
}

/// Swapped-nibble BCD digits, 0xF fills the last octet
fn semi_octets(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        for nibble in [b & 0x0f, b >> 4] {
            match nibble {
                0..=9 => out.push((b'0' + nibble) as char),
                0x0a => out.push('*'),
                0x0b => out.push('#'),
                _ => {}
            }
        }
    }
    out
}

fn read_address(r: &mut Reader<'_>, digits: usize, field: &'static str) -> Result<String, PduDecodeErr> {
    let toa = r.u8(field)?;
    let data = r.bytes(digits.div_ceil(2), field)?;
    if toa & 0x70 == 0x50 {
        // Alphanumeric sender, packed 7-bit
        let septets = alphabet::unpack_septets(data, digits * 4 / 7).ok_or(PduDecodeErr::Truncated { field })?;
        return Ok(alphabet::decode_septets(&septets));
    }
    let number = semi_octets(data);
    if toa & 0x70 == 0x10 {
        Ok(format!("+{}", number))
    } else {
        Ok(number)
    }
}

fn decode_dcs(dcs: u8) -> Result<UserDataCoding, PduDecodeErr> {
    match dcs >> 4 {
        // General data coding, with or without message class
        0x0..=0x3 => match (dcs >> 2) & 0x03 {
            0 => Ok(UserDataCoding::Text(Alphabet::Gsm7)),
            1 => Ok(UserDataCoding::Octets),
            2 => Ok(UserDataCoding::Text(Alphabet::Ucs2)),
            _ => Err(PduDecodeErr::UnsupportedDcs(dcs)),
        },
        // Message waiting indication groups
        0xc | 0xd => Ok(UserDataCoding::Text(Alphabet::Gsm7)),
        0xe => Ok(UserDataCoding::Text(Alphabet::Ucs2)),
        0xf if dcs & 0x04 == 0 => Ok(UserDataCoding::Text(Alphabet::Gsm7)),
        0xf => Ok(UserDataCoding::Octets),
        _ => Err(PduDecodeErr::UnsupportedDcs(dcs)),
    }
}

fn parse_concat(udh: &[u8]) -> Option<ConcatInfo> {
    let mut i = 0;
    while i + 1 < udh.len() {
        let iei = udh[i];
        let len = udh[i + 1] as usize;
        let data = udh.get(i + 2..i + 2 + len)?;
        match (iei, len) {
            (0x00, 3) => {
                return Some(ConcatInfo {
                    reference: data[0] as u16,
                    total: data[1],
                    seq: data[2],
                });
            }
            (0x08, 4) => {
                return Some(ConcatInfo {
                    reference: u16::from_be_bytes([data[0], data[1]]),
                    total: data[2],
                    seq: data[3],
                });
            }
            _ => {}
        }
        i += 2 + len;
    }
    None
}

fn timestamp(scts: &[u8]) -> String {
    let d: Vec<String> = scts.iter().map(|b| semi_octets(&[*b])).collect();
    // Bit 3 of the last octet (before the nibble swap) is the timezone sign
    let tz_sign = if scts[6] & 0x08 != 0 { '-' } else { '+' };
    let tz = semi_octets(&[scts[6] & 0xf7]);
    format!("{}/{}/{},{}:{}:{}{}{}", d[0], d[1], d[2], d[3], d[4], d[5], tz_sign, tz)
}

pub fn decode_deliver(hex: &str) -> Result<DeliverPdu, PduDecodeErr> {
    let bytes = hex_to_bytes(hex)?;
    let mut r = Reader { buf: &bytes, pos: 0 };

    let smsc_len = r.u8("smsc")? as usize;
    let smsc = if smsc_len > 0 {
        let toa = r.u8("smsc")?;
        let digits = semi_octets(r.bytes(smsc_len - 1, "smsc")?);
        if toa & 0x70 == 0x10 { format!("+{}", digits) } else { digits }
    } else {
        String::new()
    };

    let first = r.u8("first octet")?;
    let mti = first & 0x03;
    if mti != 0 {
        return Err(PduDecodeErr::NotDeliver(mti));
    }
    let udhi = first & 0x40 != 0;

    let oa_digits = r.u8("originator")? as usize;
    let originator = read_address(&mut r, oa_digits, "originator")?;
    let _pid = r.u8("pid")?;
    let dcs = r.u8("dcs")?;
    let coding = decode_dcs(dcs)?;
    let timestamp = timestamp(r.bytes(7, "timestamp")?);
    let udl = r.u8("udl")? as usize;
    let ud = r.rest();

    let (udh, header_len) = if udhi {
        let udhl = *ud.first().ok_or(PduDecodeErr::Truncated { field: "udh" })? as usize;
        let header = ud.get(1..1 + udhl).ok_or(PduDecodeErr::Truncated { field: "udh" })?;
        (Some(header), udhl + 1)
    } else {
        (None, 0)
    };
    let concat = udh.and_then(parse_concat);

    let text = match coding {
        UserDataCoding::Text(Alphabet::Gsm7) => {
            let septets = alphabet::unpack_septets(ud, udl).ok_or(PduDecodeErr::Truncated { field: "user data" })?;
            // Header plus fill bits occupy whole septets
            let skip = (header_len * 8).div_ceil(7);
            alphabet::decode_septets(septets.get(skip..).unwrap_or_default())
        }
        UserDataCoding::Text(Alphabet::Ucs2) => {
            let body = ud.get(header_len..udl).ok_or(PduDecodeErr::Truncated { field: "user data" })?;
            alphabet::decode_ucs2(body)
        }
        UserDataCoding::Octets => {
            let body = ud.get(header_len..udl).ok_or(PduDecodeErr::Truncated { field: "user data" })?;
            String::from_utf8_lossy(body).into_owned()
        }
    };

    Ok(DeliverPdu {
        smsc,
        originator,
        timestamp,
        coding,
        concat,
        text,
    })
}
