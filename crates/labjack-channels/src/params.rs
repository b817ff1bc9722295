use core::fmt;

/// A command parameter as the host delivers it.
///
/// Channels accept any variant and coerce it to what they need, so a value
/// typed in a script (always text) works the same as one published by a
/// linked channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Int(i64),
    Float(f64),
    Text(String),
    Buffer(Vec<u8>),
}

impl Param {
    /// Integer view. Text uses `atoi` rules: leading whitespace, an optional
    /// sign, then digits; anything without leading digits is `0`.
    pub fn to_int(&self) -> i64 {
        match self {
            Self::Int(v) => *v,
            Self::Float(v) => *v as i64,
            Self::Text(s) => leading_int(s),
            Self::Buffer(b) => leading_int(&String::from_utf8_lossy(b)),
        }
    }

    /// Floating point view. Text uses the longest numeric prefix, or `0.0`.
    pub fn to_float(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Text(s) => leading_float(s),
            Self::Buffer(b) => leading_float(&String::from_utf8_lossy(b)),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => s.clone(),
            Self::Buffer(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Buffer(b) => b.clone(),
            Self::Text(s) => s.as_bytes().to_vec(),
            other => other.to_text().into_bytes(),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<u8>> for Param {
    fn from(value: Vec<u8>) -> Self {
        Self::Buffer(value)
    }
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for c in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(c - b'0'));
    }
    if negative {
        -value
    } else {
        value
    }
}

fn leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let mut best = 0.0;
    for (i, c) in s.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) {
            break;
        }
        if let Ok(v) = s[..i + 1].parse::<f64>() {
            best = v;
        }
    }
    best
}

/// What a command hands back to its caller.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Reply {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Buffer(Vec<u8>),
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The reply as a parameter, for publishing to linked channels.
    pub fn to_param(&self) -> Option<Param> {
        match self {
            Self::Empty => None,
            Self::Int(v) => Some(Param::Int(*v)),
            Self::Float(v) => Some(Param::Float(*v)),
            Self::Text(s) => Some(Param::Text(s.clone())),
            Self::Buffer(b) => Some(Param::Buffer(b.clone())),
        }
    }
}

impl From<Param> for Reply {
    fn from(value: Param) -> Self {
        match value {
            Param::Int(v) => Self::Int(v),
            Param::Float(v) => Self::Float(v),
            Param::Text(s) => Self::Text(s),
            Param::Buffer(b) => Self::Buffer(b),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Buffer(b) => {
                for (i, byte) in b.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
