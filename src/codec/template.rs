//! Brace-placeholder message templates.
//!
//! Syntax: literal text with `{name}` or `{name:spec}` placeholders; `{{` and `}}`
//! produce literal braces. `spec` is `[[fill]align][sign][0][width][.precision][type]`
//! with `align` one of `<`, `>`, `^`, `=`, `sign` one of `+`, `-`, ` ` and `type`
//! one of `f`, `F`, `d`, `s`, `%`.
//!
//! [`FieldValue::Unavailable`] always renders as the placeholder text and ignores
//! its spec entirely, so `{snr:.1f}` with no SNR reading renders `n/a` rather than
//! failing.
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Text emitted for a value that could not be measured.
pub const UNAVAILABLE: &str = "n/a";

/// Errors from parsing or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template references a field that neither the fix nor the enrichment supplies.
    #[error("message template references an unknown key: {0}")]
    UnknownKey(String),

    #[error("malformed template at byte {position}: {reason}")]
    Malformed { position: usize, reason: String },

    #[error("format spec '{spec}' cannot be applied to field '{key}'")]
    BadFormat { key: String, spec: String },
}

/// A value substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
    /// A numeric reading that is not available right now.
    Unavailable,
}

impl FieldValue {
    /// `Float` when present, `Unavailable` otherwise.
    pub fn reading(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Unavailable, FieldValue::Float)
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, FieldValue::Unavailable)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => f.write_str(&float_repr(*v)),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Named values available to a template.
pub type Fields = BTreeMap<String, FieldValue>;

/// Shortest round-trippable rendering, always with a decimal point for integral floats.
fn float_repr(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    /// Pad between sign and digits.
    AfterSign,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FormatSpec {
    raw: String,
    fill: Option<char>,
    align: Option<Align>,
    plus: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(raw: &str, position: usize) -> Result<Self, TemplateError> {
        let malformed = |reason: &str| TemplateError::Malformed {
            position,
            reason: reason.to_string(),
        };
        let mut spec = FormatSpec {
            raw: raw.to_string(),
            ..Default::default()
        };
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;

        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            '=' => Some(Align::AfterSign),
            _ => None,
        };
        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            spec.fill = Some(chars[0]);
            spec.align = align_of(chars[1]);
            i = 2;
        } else if let Some(a) = chars.first().and_then(|c| align_of(*c)) {
            spec.align = Some(a);
            i = 1;
        }
        match chars.get(i) {
            Some('+') => {
                spec.plus = true;
                i += 1;
            }
            Some('-') => i += 1,
            Some(' ') => {
                spec.space = true;
                i += 1;
            }
            _ => {}
        }
        if chars.get(i) == Some(&'0') {
            if spec.fill.is_none() {
                spec.fill = Some('0');
                spec.align.get_or_insert(Align::AfterSign);
            }
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i > start {
            let digits: String = chars[start..i].iter().collect();
            spec.width = Some(digits.parse().map_err(|_| malformed("width too large"))?);
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if i == start {
                return Err(malformed("precision missing after '.'"));
            }
            let digits: String = chars[start..i].iter().collect();
            spec.precision = Some(digits.parse().map_err(|_| malformed("precision too large"))?);
        }
        if let Some(&c) = chars.get(i) {
            if !matches!(c, 'f' | 'F' | 'd' | 's' | '%') {
                return Err(malformed(&format!("unsupported format type '{}'", c)));
            }
            spec.kind = Some(c);
            i += 1;
        }
        if i != chars.len() {
            return Err(malformed("trailing characters in format spec"));
        }
        Ok(spec)
    }

    fn apply(&self, key: &str, value: &FieldValue) -> Result<String, TemplateError> {
        let bad = || TemplateError::BadFormat {
            key: key.to_string(),
            spec: self.raw.clone(),
        };
        let (body, numeric) = match (value, self.kind) {
            (FieldValue::Unavailable, _) => return Ok(UNAVAILABLE.to_string()),
            (FieldValue::Text(s), None | Some('s')) => {
                let text = match self.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.clone(),
                };
                (text, false)
            }
            (FieldValue::Text(_), _) => return Err(bad()),
            (FieldValue::Int(v), None | Some('d')) => {
                if self.precision.is_some() && self.kind.is_none() {
                    (self.fixed(*v as f64), true)
                } else {
                    (v.to_string(), true)
                }
            }
            (FieldValue::Int(v), Some('f' | 'F')) => (self.fixed(*v as f64), true),
            (FieldValue::Int(v), Some('%')) => (self.percent(*v as f64), true),
            (FieldValue::Float(v), Some('f' | 'F')) => (self.fixed(*v), true),
            (FieldValue::Float(v), Some('%')) => (self.percent(*v), true),
            (FieldValue::Float(v), None) => match self.precision {
                Some(_) => (self.fixed(*v), true),
                None => (float_repr(*v), true),
            },
            (FieldValue::Float(_), Some(_)) | (FieldValue::Int(_), Some(_)) => return Err(bad()),
        };
        let body = if numeric { self.signed(body) } else { body };
        Ok(self.pad(body, numeric))
    }

    fn fixed(&self, v: f64) -> String {
        format!("{:.*}", self.precision.unwrap_or(6), v)
    }

    fn percent(&self, v: f64) -> String {
        format!("{:.*}%", self.precision.unwrap_or(6), v * 100.0)
    }

    fn signed(&self, body: String) -> String {
        if body.starts_with('-') {
            body
        } else if self.plus {
            format!("+{}", body)
        } else if self.space {
            format!(" {}", body)
        } else {
            body
        }
    }

    fn pad(&self, body: String, numeric: bool) -> String {
        let width = self.width.unwrap_or(0);
        let len = body.chars().count();
        if len >= width {
            return body;
        }
        let fill = self.fill.unwrap_or(' ');
        let missing = width - len;
        let filler = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
        let align = self
            .align
            .unwrap_or(if numeric { Align::Right } else { Align::Left });
        match align {
            Align::Left => body + &filler(missing),
            Align::Right => filler(missing) + &body,
            Align::Center => {
                let left = missing / 2;
                filler(left) + &body + &filler(missing - left)
            }
            Align::AfterSign => {
                let sign_len = body
                    .chars()
                    .next()
                    .filter(|c| matches!(c, '+' | '-' | ' '))
                    .map_or(0, |c| c.len_utf8());
                let (sign, digits) = body.split_at(sign_len);
                format!("{}{}{}", sign, filler(missing), digits)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field { name: String, spec: Option<FormatSpec> },
}

/// A parsed template, reusable across renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::Malformed {
                        position: pos,
                        reason: "single '}' encountered".to_string(),
                    })
                }
                '{' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        if n == '{' {
                            return Err(TemplateError::Malformed {
                                position: pos,
                                reason: "nested '{' in placeholder".to_string(),
                            });
                        }
                        inner.push(n);
                    }
                    if !closed {
                        return Err(TemplateError::Malformed {
                            position: pos,
                            reason: "unterminated placeholder".to_string(),
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::field(&inner, pos)?);
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    fn field(inner: &str, position: usize) -> Result<Segment, TemplateError> {
        let (name, spec) = match inner.split_once(':') {
            Some((n, s)) => (n.trim(), Some(FormatSpec::parse(s, position)?)),
            None => (inner.trim(), None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TemplateError::Malformed {
                position,
                reason: format!("invalid placeholder name '{}'", name),
            });
        }
        Ok(Segment::Field {
            name: name.to_string(),
            spec,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance (duplicates kept).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, fields: &Fields) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, spec } => {
                    let value = fields
                        .get(name)
                        .ok_or_else(|| TemplateError::UnknownKey(name.clone()))?;
                    match spec {
                        Some(spec) => out.push_str(&spec.apply(name, value)?),
                        None => out.push_str(&value.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn render(src: &str, f: &Fields) -> Result<String, TemplateError> {
        Template::parse(src)?.render(f)
    }

    #[test]
    fn fixed_point_and_plain_substitution() {
        let f = fields(&[
            ("lat", FieldValue::Float(12.34567)),
            ("lon", FieldValue::Float(-45.6789)),
            ("satellites", FieldValue::Int(6)),
            ("hdop", FieldValue::Float(0.8)),
        ]);
        let out = render("GPS {lat:.2f},{lon:.2f} sats {satellites} hdop {hdop}", &f).unwrap();
        assert_eq!(out, "GPS 12.35,-45.68 sats 6 hdop 0.8");
    }

    #[test]
    fn unavailable_ignores_numeric_spec() {
        let f = fields(&[("snr", FieldValue::Unavailable)]);
        assert_eq!(render("snr {snr:.1f} dB", &f).unwrap(), "snr n/a dB");
        assert_eq!(render("snr {snr:+08.2f}", &f).unwrap(), "snr n/a");
        assert_eq!(render("snr {snr}", &f).unwrap(), "snr n/a");
    }

    #[test]
    fn unknown_key_is_named() {
        let err = render("unknown {missing}", &Fields::new()).unwrap_err();
        assert_eq!(err, TemplateError::UnknownKey("missing".to_string()));
    }

    #[test]
    fn escaped_braces_and_malformed_input() {
        let f = fields(&[("x", FieldValue::Int(1))]);
        assert_eq!(render("{{x}} = {x}", &f).unwrap(), "{x} = 1");
        assert!(matches!(render("{x", &f), Err(TemplateError::Malformed { .. })));
        assert!(matches!(render("x}", &f), Err(TemplateError::Malformed { .. })));
        assert!(matches!(render("{}", &f), Err(TemplateError::Malformed { .. })));
        assert!(matches!(render("{x:.q}", &f), Err(TemplateError::Malformed { .. })));
    }

    #[test]
    fn width_sign_and_zero_padding() {
        let f = fields(&[
            ("n", FieldValue::Int(7)),
            ("v", FieldValue::Float(-3.5)),
            ("s", FieldValue::Text("ab".into())),
        ]);
        assert_eq!(render("[{n:03d}]", &f).unwrap(), "[007]");
        assert_eq!(render("[{v:+08.2f}]", &f).unwrap(), "[-0003.50]");
        assert_eq!(render("[{n:+d}]", &f).unwrap(), "[+7]");
        assert_eq!(render("[{s:>4}]", &f).unwrap(), "[  ab]");
        assert_eq!(render("[{s:*^6}]", &f).unwrap(), "[**ab**]");
        assert_eq!(render("[{s:4}]", &f).unwrap(), "[ab  ]");
    }

    #[test]
    fn integral_floats_keep_a_decimal_point() {
        let f = fields(&[("hdop", FieldValue::Float(0.0))]);
        assert_eq!(render("{hdop}", &f).unwrap(), "0.0");
    }

    #[test]
    fn text_rejects_numeric_spec() {
        let f = fields(&[("time", FieldValue::Text("12:00:00".into()))]);
        assert!(matches!(
            render("{time:.2f}", &f),
            Err(TemplateError::BadFormat { .. })
        ));
    }

    #[test]
    fn keys_lists_placeholders() {
        let t = Template::parse("{a} {b:.1f} {a}").unwrap();
        assert_eq!(t.keys().collect::<Vec<_>>(), vec!["a", "b", "a"]);
    }
}
