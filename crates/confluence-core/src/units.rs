//! Unit-of-measure values with dimension tracking and scale conversion.
//!
//! The framework needs just enough unit arithmetic to negotiate ports,
//! convert magnitudes on pull, and rewrite units through time-integrating
//! adapters (rate × time → amount). [`Units`] is a value type carrying a
//! dimension-exponent vector (length, mass, time) and a scale factor
//! relative to the SI base. Anything beyond that — full SI coverage,
//! affine units, calendars — is a collaborator concern and can be layered
//! behind this type.

use std::error::Error;
use std::fmt;

/// Dimension exponents: `[length, mass, time]`.
type Dims = [i8; 3];

const DIMENSIONLESS: Dims = [0, 0, 0];

/// A unit of measure with dimension exponents and an SI scale factor.
///
/// Two units are *convertible* when their dimensions match; the conversion
/// factor is the ratio of their scales. Equality is dimension + scale —
/// `"m/s"` parsed twice compares equal, `"km/h"` does not equal `"m/s"`
/// even though they are convertible.
#[derive(Clone, Debug)]
pub struct Units {
    dims: Dims,
    scale: f64,
    repr: String,
}

impl Units {
    /// The dimensionless unit with scale 1.
    pub fn dimensionless() -> Self {
        Self {
            dims: DIMENSIONLESS,
            scale: 1.0,
            repr: String::new(),
        }
    }

    /// The SI second, used by integration adapters to rewrite units.
    pub fn seconds() -> Self {
        Self {
            dims: [0, 0, 1],
            scale: 1.0,
            repr: "s".to_string(),
        }
    }

    /// Parse a unit expression.
    ///
    /// Grammar: atoms joined by `*` and `/`, each atom a known symbol with
    /// an optional `^<int>` exponent; `1` and the empty string are
    /// dimensionless. Each `/` applies to the single atom that follows it.
    ///
    /// ```
    /// use confluence_core::units::Units;
    /// let rate = Units::parse("mm/day").unwrap();
    /// let speed = Units::parse("m/s").unwrap();
    /// assert!(rate.convertible(&speed));
    /// ```
    pub fn parse(expr: &str) -> Result<Self, UnitParseError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() || trimmed == "1" {
            return Ok(Self::dimensionless());
        }

        fn flush(
            atom: &mut String,
            sign: i8,
            dims: &mut Dims,
            scale: &mut f64,
        ) -> Result<(), UnitParseError> {
            if atom.is_empty() {
                return Ok(());
            }
            let (symbol, exp) = split_exponent(atom)?;
            let (atom_dims, atom_scale) = lookup(symbol).ok_or_else(|| UnitParseError {
                token: symbol.to_string(),
            })?;
            let exp = exp * i32::from(sign);
            for (d, a) in dims.iter_mut().zip(atom_dims) {
                *d += a * exp as i8;
            }
            *scale *= atom_scale.powi(exp);
            atom.clear();
            Ok(())
        }

        let mut dims = DIMENSIONLESS;
        let mut scale = 1.0f64;
        let mut sign = 1i8;
        let mut atom = String::new();

        for c in trimmed.chars() {
            match c {
                '*' => {
                    flush(&mut atom, sign, &mut dims, &mut scale)?;
                    sign = 1;
                }
                '/' => {
                    flush(&mut atom, sign, &mut dims, &mut scale)?;
                    sign = -1;
                }
                c if c.is_whitespace() => {}
                c => atom.push(c),
            }
        }
        flush(&mut atom, sign, &mut dims, &mut scale)?;

        Ok(Self {
            dims,
            scale,
            repr: trimmed.to_string(),
        })
    }

    /// Whether this unit carries no dimensions and unit scale.
    pub fn is_dimensionless(&self) -> bool {
        self.dims == DIMENSIONLESS && self.scale == 1.0
    }

    /// Whether magnitudes in `self` can be converted to `other`.
    pub fn convertible(&self, other: &Self) -> bool {
        self.dims == other.dims
    }

    /// The multiplicative factor converting a magnitude in `self` to one
    /// in `other`. `None` when the dimensions differ.
    pub fn factor_to(&self, other: &Self) -> Option<f64> {
        if !self.convertible(other) {
            return None;
        }
        Some(self.scale / other.scale)
    }

    /// The product unit (`self * other`).
    pub fn multiply(&self, other: &Self) -> Self {
        let mut dims = self.dims;
        for (d, o) in dims.iter_mut().zip(other.dims) {
            *d += o;
        }
        Self {
            dims,
            scale: self.scale * other.scale,
            repr: join_repr(&self.repr, &other.repr),
        }
    }

    /// The unit with the same dimensions and scale 1, rendered from SI
    /// base symbols. Time-integrating adapters convert their result to
    /// this to avoid leaking mixed scales like `s/day` downstream.
    pub fn canonical(&self) -> Self {
        Self {
            dims: self.dims,
            scale: 1.0,
            repr: render_dims(self.dims),
        }
    }
}

impl PartialEq for Units {
    fn eq(&self, other: &Self) -> bool {
        self.dims == other.dims && self.scale == other.scale
    }
}

impl Eq for Units {}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repr.is_empty() {
            write!(f, "1")
        } else {
            write!(f, "{}", self.repr)
        }
    }
}

/// A unit expression contained an unknown symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitParseError {
    /// The symbol that could not be resolved.
    pub token: String,
}

impl fmt::Display for UnitParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown unit symbol '{}'", self.token)
    }
}

impl Error for UnitParseError {}

fn split_exponent(atom: &str) -> Result<(&str, i32), UnitParseError> {
    match atom.split_once('^') {
        Some((symbol, exp)) => {
            let exp: i32 = exp.parse().map_err(|_| UnitParseError {
                token: atom.to_string(),
            })?;
            Ok((symbol, exp))
        }
        None => Ok((atom, 1)),
    }
}

/// Symbol table: `(dims, scale)` relative to (m, kg, s).
fn lookup(symbol: &str) -> Option<(Dims, f64)> {
    let entry = match symbol {
        "1" => (DIMENSIONLESS, 1.0),
        "m" => ([1, 0, 0], 1.0),
        "km" => ([1, 0, 0], 1000.0),
        "dm" => ([1, 0, 0], 0.1),
        "cm" => ([1, 0, 0], 0.01),
        "mm" => ([1, 0, 0], 0.001),
        "kg" => ([0, 1, 0], 1.0),
        "g" => ([0, 1, 0], 1e-3),
        "mg" => ([0, 1, 0], 1e-6),
        "t" => ([0, 1, 0], 1000.0),
        "s" => ([0, 0, 1], 1.0),
        "min" => ([0, 0, 1], 60.0),
        "h" => ([0, 0, 1], 3600.0),
        "d" | "day" => ([0, 0, 1], 86400.0),
        _ => return None,
    };
    Some(entry)
}

fn join_repr(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => String::new(),
        (true, false) => b.to_string(),
        (false, true) => a.to_string(),
        (false, false) => format!("{a}*{b}"),
    }
}

fn render_dims(dims: Dims) -> String {
    const SYMBOLS: [&str; 3] = ["m", "kg", "s"];
    let mut numerator = Vec::new();
    let mut denominator = Vec::new();
    for (symbol, &exp) in SYMBOLS.iter().zip(&dims) {
        match exp {
            0 => {}
            1 => numerator.push(symbol.to_string()),
            -1 => denominator.push(symbol.to_string()),
            e if e > 0 => numerator.push(format!("{symbol}^{e}")),
            e => denominator.push(format!("{symbol}^{}", -e)),
        }
    }
    let num = if numerator.is_empty() {
        if denominator.is_empty() {
            return String::new();
        }
        "1".to_string()
    } else {
        numerator.join("*")
    };
    if denominator.is_empty() {
        num
    } else {
        format!("{num}/{}", denominator.join("/"))
    }
}
