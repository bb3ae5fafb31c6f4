//! Remote port input.
//!
//! Ports arrive either as numbers or as text taken straight from a
//! configuration file or a protocol header. Both are coerced to an integer
//! the same way before range validation, so `"8080"`, `" 8080"` and
//! `"8080/tcp"` all name port 8080 while `"http"` names nothing.

use std::fmt;

/// A remote port as supplied by the caller, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RemotePort {
    /// A numeric port, possibly out of range.
    Number(i64),
    /// A textual port, coerced with [`RemotePort::coerce`].
    Text(Box<str>),
}

impl RemotePort {
    /// Coerces the port to an integer.
    ///
    /// Text is parsed leniently: leading whitespace is skipped, an optional
    /// sign is accepted, a `0x`/`0X` prefix switches to hexadecimal, and
    /// parsing stops at the first character that is not a digit. Returns
    /// `None` when no digit could be read.
    pub fn coerce(&self) -> Option<i64> {
        match self {
            RemotePort::Number(n) => Some(*n),
            RemotePort::Text(s) => parse_int(s),
        }
    }

    /// Returns the port if it lies within `1..=65535`.
    pub fn validate(&self) -> Option<u16> {
        self.coerce()
            .filter(|port| (1..=i64::from(u16::MAX)).contains(port))
            .and_then(|port| u16::try_from(port).ok())
    }
}

impl fmt::Display for RemotePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.coerce() {
            Some(port) => write!(f, "{port}"),
            None => f.write_str("NaN"),
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for RemotePort {
                #[inline]
                fn from(port: $ty) -> RemotePort {
                    RemotePort::Number(i64::from(port))
                }
            }
        )*
    };
}

impl_from_int!(u8, u16, u32, i8, i16, i32, i64);

macro_rules! impl_from_wide_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for RemotePort {
                #[inline]
                fn from(port: $ty) -> RemotePort {
                    let saturated = if port > 0 { i64::MAX } else { i64::MIN };
                    RemotePort::Number(i64::try_from(port).unwrap_or(saturated))
                }
            }
        )*
    };
}

impl_from_wide_int!(u64, usize, isize);

/// Fractional ports are truncated toward zero; NaN and infinities name no
/// port at all.
impl From<f64> for RemotePort {
    fn from(port: f64) -> RemotePort {
        if port.is_finite() {
            // `as` saturates at the i64 bounds
            RemotePort::Number(port.trunc() as i64)
        } else {
            RemotePort::Text(Box::from(""))
        }
    }
}

impl From<f32> for RemotePort {
    #[inline]
    fn from(port: f32) -> RemotePort {
        RemotePort::from(f64::from(port))
    }
}

impl From<&str> for RemotePort {
    fn from(port: &str) -> RemotePort {
        RemotePort::Text(port.into())
    }
}

impl From<String> for RemotePort {
    fn from(port: String) -> RemotePort {
        RemotePort::Text(port.into_boxed_str())
    }
}

impl From<&String> for RemotePort {
    fn from(port: &String) -> RemotePort {
        RemotePort::Text(port.as_str().into())
    }
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, digits) = match s.get(..2) {
        Some("0x") | Some("0X") => (16, &s[2..]),
        _ => (10, s),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else {
            break;
        };
        seen = true;
        value = value
            .saturating_mul(i64::from(radix))
            .saturating_add(i64::from(d));
    }

    if !seen {
        return None;
    }

    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_in_range() {
        assert_eq!(RemotePort::from(1u16).validate(), Some(1));
        assert_eq!(RemotePort::from(80).validate(), Some(80));
        assert_eq!(RemotePort::from(65535).validate(), Some(65535));
    }

    #[test]
    fn numbers_out_of_range() {
        assert_eq!(RemotePort::from(0).validate(), None);
        assert_eq!(RemotePort::from(-1).validate(), None);
        assert_eq!(RemotePort::from(65536).validate(), None);
        assert_eq!(RemotePort::from(i64::MAX).validate(), None);
    }

    #[test]
    fn text_is_coerced() {
        assert_eq!(RemotePort::from("8080").validate(), Some(8080));
        assert_eq!(RemotePort::from("  443").validate(), Some(443));
        assert_eq!(RemotePort::from("+22").validate(), Some(22));
        assert_eq!(RemotePort::from("8080/tcp").validate(), Some(8080));
        assert_eq!(RemotePort::from("0x50").validate(), Some(80));
        assert_eq!(RemotePort::from(String::from("9999")).validate(), Some(9999));
    }

    #[test]
    fn text_not_a_number() {
        for bad in ["", "http", "-", "0x", " ", "port80"] {
            let port = RemotePort::from(bad);
            assert_eq!(port.coerce(), None, "{bad:?}");
            assert_eq!(port.validate(), None, "{bad:?}");
            assert_eq!(port.to_string(), "NaN");
        }
    }

    #[test]
    fn text_out_of_range() {
        assert_eq!(RemotePort::from("0").validate(), None);
        assert_eq!(RemotePort::from("-80").validate(), None);
        assert_eq!(RemotePort::from("70000").validate(), None);
        assert_eq!(RemotePort::from("99999999999999999999999").validate(), None);
    }

    #[test]
    fn wide_integers() {
        assert_eq!(RemotePort::from(8080u64).validate(), Some(8080));
        assert_eq!(RemotePort::from(8080usize).validate(), Some(8080));
        assert_eq!(RemotePort::from(8080isize).validate(), Some(8080));
        assert_eq!(RemotePort::from(u64::MAX).coerce(), Some(i64::MAX));
        assert_eq!(RemotePort::from(u64::MAX).validate(), None);
        assert_eq!(RemotePort::from(-1isize).validate(), None);
    }

    #[test]
    fn floats_truncate() {
        assert_eq!(RemotePort::from(80.9_f64).validate(), Some(80));
        assert_eq!(RemotePort::from(443.0_f32).validate(), Some(443));
        assert_eq!(RemotePort::from(65535.5_f64).validate(), Some(65535));
        assert_eq!(RemotePort::from(0.5_f64).validate(), None);
        assert_eq!(RemotePort::from(-0.5_f64).to_string(), "0");
        assert_eq!(RemotePort::from(1e30_f64).validate(), None);
    }

    #[test]
    fn non_finite_floats_are_nan() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let port = RemotePort::from(bad);
            assert_eq!(port.coerce(), None, "{bad}");
            assert_eq!(port.validate(), None, "{bad}");
            assert_eq!(port.to_string(), "NaN");
        }
    }

    #[test]
    fn display_shows_coerced_value() {
        assert_eq!(RemotePort::from(" 80abc").to_string(), "80");
        assert_eq!(RemotePort::from(-3).to_string(), "-3");
        assert_eq!(RemotePort::from(70000u32).to_string(), "70000");
    }
}
