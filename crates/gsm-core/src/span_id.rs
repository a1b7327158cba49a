use core::fmt;

use serde::Deserialize;

/// Upper bound on the number of spans a single gateway drives
pub const MAX_SPANS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanIdErr {
    OutOfRange { found: u32 },
}

impl fmt::Display for SpanIdErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanIdErr::OutOfRange { found } => write!(f, "span {} out of range 1..={}", found, MAX_SPANS),
        }
    }
}

impl std::error::Error for SpanIdErr {}

/// Span number as used in configuration and by operators (1-based).
/// Construction validates the range, so `index()` is always a valid slot in a span arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u32")]
pub struct SpanId(u8);

impl SpanId {
    pub fn new(number: u32) -> Result<Self, SpanIdErr> {
        if number == 0 || number as usize > MAX_SPANS {
            return Err(SpanIdErr::OutOfRange { found: number });
        }
        Ok(SpanId(number as u8))
    }

    /// Builds a SpanId from a 0-based arena index
    pub fn from_index(index: usize) -> Result<Self, SpanIdErr> {
        Self::new(index as u32 + 1)
    }

    /// 1-based span number
    pub fn number(self) -> u32 {
        self.0 as u32
    }

    /// 0-based arena index
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u32> for SpanId {
    type Error = SpanIdErr;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SpanId::new(value)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "span{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_id_bounds() {
        assert!(SpanId::new(0).is_err());
        assert!(SpanId::new(MAX_SPANS as u32 + 1).is_err());

        let first = SpanId::new(1).unwrap();
        assert_eq!(first.index(), 0);
        let last = SpanId::new(MAX_SPANS as u32).unwrap();
        assert_eq!(last.index(), MAX_SPANS - 1);
        assert_eq!(SpanId::from_index(last.index()).unwrap(), last);
    }
}
