//! Kubernetes resource quantities
//!
//! Parses the `resource.Quantity` string grammar (`250m`, `64Mi`, `2.5G`, `1e3`) into an
//! exact nano-unit value and converts quantities into scaled integers suitable for an
//! optimization range. Binary (power of 1024) quantities are scaled in 1024 steps so a
//! `2Gi` memory request reads as `2048` at the mega scale instead of `2148`.

use crate::error::{GenerationError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Exponent of ten used to express a quantity in a given unit.
///
/// Binary quantities use the same exponents: `KILO` is also kibi, `MEGA` is also mebi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scale(pub i32);

impl Scale {
    pub const NANO: Scale = Scale(-9);
    pub const MICRO: Scale = Scale(-6);
    pub const MILLI: Scale = Scale(-3);
    pub const UNIT: Scale = Scale(0);
    pub const KILO: Scale = Scale(3);
    pub const MEGA: Scale = Scale(6);
    pub const GIGA: Scale = Scale(9);
    pub const TERA: Scale = Scale(12);
    pub const PETA: Scale = Scale(15);
    pub const EXA: Scale = Scale(18);

    /// The next finer scale (three exponent steps down)
    pub fn finer(self) -> Scale {
        Scale(self.0 - 3)
    }
}

/// How a quantity was (or should be) written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Power of 1024 suffixes: Ki, Mi, Gi, ...
    BinarySI,
    /// Power of 1000 suffixes: n, u, m, k, M, G, ...
    #[default]
    DecimalSI,
    /// Scientific notation: 1e3, 5E-3
    DecimalExponent,
}

const BINARY_SUFFIXES: [&str; 10] = ["", "", "", "", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 10] = ["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

/// A parsed resource quantity
#[derive(Debug, Clone)]
pub struct Quantity {
    nanos: i128,
    format: Format,
    repr: String,
}

impl Quantity {
    /// Create a whole-unit quantity with an explicit format
    pub fn new(value: i64, format: Format) -> Self {
        Self::from_nanos(i128::from(value) * NANOS_PER_UNIT, format)
    }

    /// Create a quantity from a milli-unit value (e.g. millicores)
    pub fn new_milli(value: i64) -> Self {
        Self::from_nanos(i128::from(value) * 1_000_000, Format::DecimalSI)
    }

    fn from_nanos(nanos: i128, format: Format) -> Self {
        let repr = canonical(nanos, format);
        Self {
            nanos,
            format,
            repr,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// Whole-unit value, rounded up
    pub fn value(&self) -> i64 {
        self.scaled_value(Scale::UNIT)
    }

    /// Milli-unit value, rounded up
    pub fn milli_value(&self) -> i64 {
        self.scaled_value(Scale::MILLI)
    }

    /// Decimal value at the given scale, rounded up (`ceil(value / 10^scale)`)
    pub fn scaled_value(&self, scale: Scale) -> i64 {
        let shift = scale.0 + 9;
        let v = if shift >= 0 {
            match 10i128.checked_pow(shift as u32) {
                Some(d) => div_ceil(self.nanos, d),
                None => 0,
            }
        } else {
            match 10i128.checked_pow((-shift) as u32) {
                Some(m) => self.nanos.saturating_mul(m),
                None => i128::MAX,
            }
        };
        saturate_i64(v)
    }

    /// The original text of the quantity
    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl FromStr for Quantity {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s.trim()).ok_or_else(|| GenerationError::InvalidQuantity(s.to_string()))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.repr)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct QuantityVisitor;

        impl<'de> de::Visitor<'de> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a resource quantity")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Quantity, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Quantity, E> {
                Ok(Quantity::new(v, Format::DecimalSI))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Quantity, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Quantity, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// Convert a quantity into an integer at the requested scale.
///
/// Decimal quantities use the (rounded up) decimal scaled value. Binary quantities are
/// divided or multiplied by 1024 once per three exponent steps.
pub fn as_scaled_int(q: &Quantity, scale: Scale) -> i32 {
    if q.format() != Format::BinarySI {
        return saturate_i32(i128::from(q.scaled_value(scale)));
    }

    let mut v = i128::from(q.value());
    let steps = scale.0 / 3;
    if steps > 0 {
        for _ in 0..steps {
            v /= 1024;
        }
    } else {
        for _ in 0..steps.unsigned_abs() {
            v = v.saturating_mul(1024);
        }
    }
    saturate_i32(v)
}

/// Unit suffix for a scale in the given format, or `""` when the scale has none
pub fn quantity_suffix(scale: Scale, format: Format) -> &'static str {
    if scale.0 % 3 != 0 {
        return "";
    }
    let index = scale.0 / 3 + 3;
    if !(0..10).contains(&index) {
        return "";
    }
    let index = index as usize;
    match format {
        Format::BinarySI => BINARY_SUFFIXES[index],
        Format::DecimalSI | Format::DecimalExponent => DECIMAL_SUFFIXES[index],
    }
}

fn parse(s: &str) -> Option<Quantity> {
    let bytes = s.as_bytes();
    let mut pos = 0;

    let negative = match bytes.first() {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_part = &s[int_start..pos];

    let mut frac_part = "";
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        let frac_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        frac_part = &s[frac_start..pos];
    }

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let suffix = &s[pos..];
    let (format, base, exponent) = parse_suffix(suffix)?;

    let digits = format!("{int_part}{frac_part}");
    let mut mantissa: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().ok()?
    };
    if negative {
        mantissa = -mantissa;
    }

    // nanos = mantissa * base^exponent * 10^(9 - frac_len)
    let mut numerator = mantissa;
    let mut pow10 = 9 - frac_part.len() as i32;
    if base == 10 {
        pow10 += exponent;
    } else {
        numerator = numerator.checked_mul(base.checked_pow(exponent.unsigned_abs())?)?;
    }
    let nanos = if pow10 >= 0 {
        numerator.checked_mul(10i128.checked_pow(pow10 as u32)?)?
    } else {
        div_ceil(numerator, 10i128.checked_pow(pow10.unsigned_abs())?)
    };

    Some(Quantity {
        nanos,
        format,
        repr: s.to_string(),
    })
}

/// Returns the format plus the base and exponent the suffix multiplies by
fn parse_suffix(suffix: &str) -> Option<(Format, i128, i32)> {
    let decimal = |e: i32| Some((Format::DecimalSI, 10, e));
    let binary = |e: i32| Some((Format::BinarySI, 1024, e));
    match suffix {
        "" => decimal(0),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        _ => {
            let rest = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            let exponent: i32 = rest.parse().ok()?;
            Some((Format::DecimalExponent, 10, exponent))
        }
    }
}

fn canonical(nanos: i128, format: Format) -> String {
    if format == Format::BinarySI && nanos % NANOS_PER_UNIT == 0 {
        let mut value = nanos / NANOS_PER_UNIT;
        let mut index = 3;
        while value != 0 && value % 1024 == 0 && index < BINARY_SUFFIXES.len() - 1 {
            value /= 1024;
            index += 1;
        }
        return format!("{value}{}", BINARY_SUFFIXES[index]);
    }

    if nanos % NANOS_PER_UNIT == 0 {
        format!("{}", nanos / NANOS_PER_UNIT)
    } else if nanos % 1_000_000 == 0 {
        format!("{}m", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}u", nanos / 1_000)
    } else {
        format!("{nanos}n")
    }
}

fn div_ceil(n: i128, d: i128) -> i128 {
    let q = n / d;
    if (n % d != 0) && ((n > 0) == (d > 0)) {
        q + 1
    } else {
        q
    }
}

fn saturate_i64(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

fn saturate_i32(v: i128) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}
