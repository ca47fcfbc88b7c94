//! `str.format`, `format()`-style specs and `%` interpolation.
//!
//! Supported format-spec subset: `[[fill]align][sign][0][width][,|_][.precision][type]`
//! with types `s d f F % e E g G x X o b`.

use super::ops::check_allocation;
use super::{Args, Exception, ExceptionKind};
use crate::value::{format_float, Value};

/// Widest field accepted, as in CPython.
const MAX_WIDTH: usize = i32::MAX as usize;
/// Largest precision accepted. `format!` refuses anything above `u16::MAX`.
const MAX_PRECISION: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq)]
struct Spec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    ty: Option<char>,
}

impl Default for Spec {
    fn default() -> Self {
        Spec {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            ty: None,
        }
    }
}

fn invalid_spec(spec: &str) -> Exception {
    Exception::value_error(format!("Invalid format specifier '{}'", spec))
}

/// Parse a run of digits as a width or precision no larger than `max`.
fn bounded(digits: &[char], max: usize, what: &str) -> Result<usize, Exception> {
    digits
        .iter()
        .collect::<String>()
        .parse::<usize>()
        .ok()
        .filter(|&n| n <= max)
        .ok_or_else(|| Exception::value_error(format!("{} too big", what)))
}

fn parse_spec(text: &str) -> Result<Spec, Exception> {
    let chars: Vec<char> = text.chars().collect();
    let mut spec = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        spec.fill = chars[0];
        spec.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        spec.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            spec.sign = c;
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        spec.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        if spec.align.is_none() {
            spec.fill = '0';
            spec.align = Some('=');
        }
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        spec.width = bounded(&chars[start..i], MAX_WIDTH, "width")?;
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            spec.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(Exception::value_error("Format specifier missing precision"));
        }
        spec.precision = Some(bounded(&chars[start..i], MAX_PRECISION, "precision")?);
    }
    if let Some(&c) = chars.get(i) {
        spec.ty = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid_spec(text));
    }
    Ok(spec)
}

fn group_digits(digits: &str, sep: char) -> String {
    let (int_part, rest) = match digits.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => digits.split_at(pos),
        None => (digits, ""),
    };
    let mut out = String::new();
    for (n, c) in int_part.chars().enumerate() {
        if n > 0 && (int_part.len() - n) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out.push_str(rest);
    out
}

/// Python's `e` formatting: at least two exponent digits, explicit sign.
pub(crate) fn format_exp(value: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, value);
    let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:0>2}", mantissa, e, sign, digits)
}

fn strip_zeros(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn format_general(value: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let p = precision.max(1);
    if value == 0.0 {
        return if alternate { format!("{:.*}", p - 1, 0.0) } else { "0".to_string() };
    }
    let sci = format!("{:.*e}", p - 1, value);
    let exp: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let text = if exp >= -4 && exp < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, value)
    } else {
        format_exp(value, p - 1, upper)
    };
    if alternate {
        return text;
    }
    match text.split_once(['e', 'E']) {
        Some((mantissa, exp)) => {
            let e = if upper { 'E' } else { 'e' };
            format!("{}{}{}", strip_zeros(mantissa), e, exp)
        }
        None => strip_zeros(&text),
    }
}

fn non_finite(value: f64, upper: bool) -> Option<String> {
    let text = if value.is_nan() {
        "nan"
    } else if value.is_infinite() {
        "inf"
    } else {
        return None;
    };
    Some(if upper { text.to_uppercase() } else { text.to_string() })
}

fn unknown_code(ty: char, value: &Value) -> Exception {
    Exception::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        ty,
        value.type_name()
    ))
}

/// Apply a format spec to a value, as `format(value, spec)` does.
///
/// Padding is charged against `limit` before it is built.
pub fn format_value(value: &Value, spec_text: &str, limit: usize) -> Result<String, Exception> {
    if spec_text.is_empty() {
        return Ok(value.to_str());
    }
    let spec = parse_spec(spec_text)?;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let (negative, mut body) = match (value, spec.ty) {
        (Value::Str(s), None | Some('s')) => {
            let text = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (false, text)
        }
        (Value::Int(_) | Value::Bool(_), None | Some('d' | 'n')) => {
            let i = value.as_index().unwrap_or(0);
            if spec.precision.is_some() {
                return Err(Exception::value_error(
                    "Precision not allowed in integer format specifier",
                ));
            }
            (i < 0, i.unsigned_abs().to_string())
        }
        (Value::Int(_) | Value::Bool(_), Some(ty @ ('x' | 'X' | 'o' | 'b'))) => {
            let i = value.as_index().unwrap_or(0);
            let magnitude = i.unsigned_abs();
            let digits = match ty {
                'x' => format!("{:x}", magnitude),
                'X' => format!("{:X}", magnitude),
                'o' => format!("{:o}", magnitude),
                _ => format!("{:b}", magnitude),
            };
            let prefix = if spec.alternate {
                match ty {
                    'x' => "0x",
                    'X' => "0X",
                    'o' => "0o",
                    _ => "0b",
                }
            } else {
                ""
            };
            (i < 0, format!("{}{}", prefix, digits))
        }
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), Some(ty))
            if matches!(ty, 'f' | 'F' | '%' | 'e' | 'E' | 'g' | 'G') =>
        {
            let f = value.as_f64().unwrap_or(0.0);
            let upper = ty.is_ascii_uppercase();
            let magnitude = if ty == '%' { f.abs() * 100.0 } else { f.abs() };
            let text = match non_finite(magnitude, upper) {
                Some(text) => text,
                None => match ty {
                    'f' | 'F' => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
                    '%' => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude),
                    'e' | 'E' => format_exp(magnitude, spec.precision.unwrap_or(6), upper),
                    _ => format_general(magnitude, spec.precision.unwrap_or(6), upper, spec.alternate),
                },
            };
            (f.is_sign_negative() && !f.is_nan(), text)
        }
        (Value::Float(f), None) => {
            let magnitude = f.abs();
            let text = match spec.precision {
                Some(p) => match non_finite(magnitude, false) {
                    Some(text) => text,
                    None => format_general(magnitude, p, false, false),
                },
                None => format_float(magnitude),
            };
            (f.is_sign_negative() && !f.is_nan(), text)
        }
        (v, Some(ty)) if numeric || matches!(v, Value::Str(_)) => return Err(unknown_code(ty, v)),
        (v, None) => (false, v.to_str()),
        (v, Some('s')) => (false, v.to_str()),
        (v, Some(ty)) => return Err(unknown_code(ty, v)),
    };

    if let Some(sep) = spec.grouping {
        if !numeric {
            return Err(Exception::value_error(format!(
                "Cannot specify '{}' with 's'.",
                sep
            )));
        }
        body = group_digits(&body, sep);
    }
    let sign = if negative {
        "-"
    } else if numeric && spec.sign == '+' {
        "+"
    } else if numeric && spec.sign == ' ' {
        " "
    } else {
        ""
    };
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return Ok(format!("{}{}", sign, body));
    }
    let pad = spec.width - len;
    check_allocation(spec.width.saturating_mul(spec.fill.len_utf8()), limit)?;
    let fill = |n: usize| -> String { std::iter::repeat(spec.fill).take(n).collect() };
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '<' => format!("{}{}{}", sign, body, fill(pad)),
        '^' => format!("{}{}{}{}", fill(pad / 2), sign, body, fill(pad - pad / 2)),
        '=' => format!("{}{}{}", sign, fill(pad), body),
        _ => format!("{}{}{}", fill(pad), sign, body),
    })
}

fn lookup_field(field: &str, args: &Args, auto: &mut usize) -> Result<Value, Exception> {
    let (name, rest) = match field.find(['.', '[']) {
        Some(pos) => field.split_at(pos),
        None => (field, ""),
    };
    let mut value = if name.is_empty() {
        let i = *auto;
        *auto += 1;
        args.positional.get(i).cloned().ok_or_else(|| {
            Exception::index_error(format!(
                "Replacement index {} out of range for positional args tuple",
                i
            ))
        })?
    } else if let Ok(i) = name.parse::<usize>() {
        args.positional.get(i).cloned().ok_or_else(|| {
            Exception::index_error(format!(
                "Replacement index {} out of range for positional args tuple",
                i
            ))
        })?
    } else {
        args.keyword(name)
            .cloned()
            .ok_or_else(|| Exception::key_error(&Value::Str(name.to_string())))?
    };
    // Only `[key]` item access is supported inside a field.
    let mut rest = rest;
    while let Some(inner) = rest.strip_prefix('[') {
        let end = inner
            .find(']')
            .ok_or_else(|| Exception::value_error("Missing ']' in format string"))?;
        let key = &inner[..end];
        rest = &inner[end + 1..];
        value = match &value {
            Value::List(items) | Value::Tuple(items) => {
                let i: usize = key
                    .parse()
                    .map_err(|_| Exception::type_error("list indices must be integers"))?;
                items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| Exception::index_error("list index out of range"))?
            }
            Value::Dict(pairs) => {
                let k = match key.parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::Str(key.to_string()),
                };
                pairs
                    .iter()
                    .find(|(pk, _)| pk.py_eq(&k))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| Exception::key_error(&k))?
            }
            other => {
                return Err(Exception::type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                )))
            }
        };
    }
    if !rest.is_empty() {
        return Err(Exception::new(
            ExceptionKind::AttributeError,
            format!("attribute access in format fields is not supported: '{}'", field),
        ));
    }
    Ok(value)
}

/// `template.format(*args, **kwargs)`.
pub fn str_format(template: &str, args: &Args, limit: usize) -> Result<String, Exception> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(Exception::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    field.push(c);
                }
                if depth != 0 {
                    return Err(Exception::value_error(
                        "expected '}' before end of string",
                    ));
                }
                let (head, spec) = match field.split_once(':') {
                    Some((h, s)) => (h.to_string(), s.to_string()),
                    None => (field.clone(), String::new()),
                };
                let (name, conversion) = match head.split_once('!') {
                    Some((n, c)) => (n.to_string(), Some(c.to_string())),
                    None => (head, None),
                };
                // Nested fields in the format spec, e.g. `{:{width}}`.
                let spec = if spec.contains('{') {
                    str_format(&spec, args, limit)?
                } else {
                    spec
                };
                let mut value = lookup_field(&name, args, &mut auto)?;
                match conversion.as_deref() {
                    None => {}
                    Some("r") => value = Value::Str(value.repr()),
                    Some("s") => value = Value::Str(value.to_str()),
                    Some(other) => {
                        return Err(Exception::value_error(format!(
                            "Unknown conversion specifier {}",
                            other
                        )))
                    }
                }
                out.push_str(&format_value(&value, &spec, limit)?);
                check_allocation(out.len(), limit)?;
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// `template % values`.
pub fn percent_format(template: &str, values: &Value, limit: usize) -> Result<String, Exception> {
    let (items, mapping): (Vec<Value>, Option<&Vec<(Value, Value)>>) = match values {
        Value::Tuple(items) => (items.clone(), None),
        Value::Dict(pairs) => (vec![values.clone()], Some(pairs)),
        other => (vec![other.clone()], None),
    };
    let mut next = 0usize;
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut key: Option<String> = None;
        if chars.get(i) == Some(&'(') {
            let close = chars[i..]
                .iter()
                .position(|&c| c == ')')
                .ok_or_else(|| Exception::value_error("incomplete format key"))?;
            key = Some(chars[i + 1..i + close].iter().collect());
            i += close + 1;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' => spec.sign = '+',
                ' ' => spec.sign = ' ',
                '0' => {
                    if spec.align.is_none() {
                        spec.fill = '0';
                        spec.align = Some('=');
                    }
                }
                '#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i > start {
            spec.width = bounded(&chars[start..i], MAX_WIDTH, "width")?;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            // A bare `.` means precision zero.
            spec.precision = Some(if i > start {
                bounded(&chars[start..i], MAX_PRECISION, "precision")?
            } else {
                0
            });
        }
        let ty = *chars
            .get(i)
            .ok_or_else(|| Exception::value_error("incomplete format"))?;
        i += 1;
        if ty == '%' {
            out.push('%');
            continue;
        }
        let value = match (&key, mapping) {
            (Some(k), Some(pairs)) => pairs
                .iter()
                .find(|(pk, _)| pk.as_str() == Some(k.as_str()))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Exception::key_error(&Value::Str(k.clone())))?,
            (Some(_), None) => {
                return Err(Exception::type_error("format requires a mapping"));
            }
            (None, _) => {
                let v = items.get(next).cloned().ok_or_else(|| {
                    Exception::type_error("not enough arguments for format string")
                })?;
                next += 1;
                v
            }
        };
        let (value, code) = match ty {
            's' => (Value::Str(value.to_str()), 's'),
            'r' | 'a' => (Value::Str(value.repr()), 's'),
            'd' | 'i' | 'u' => {
                let int = match &value {
                    Value::Float(f) if f.is_finite() => Value::Int(f.trunc() as i64),
                    v if v.as_index().is_some() => Value::Int(v.as_index().unwrap_or(0)),
                    v => {
                        return Err(Exception::type_error(format!(
                            "%{} format: a real number is required, not {}",
                            ty,
                            v.type_name()
                        )))
                    }
                };
                (int, 'd')
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let f = value.as_f64().ok_or_else(|| {
                    Exception::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                (Value::Float(f), ty)
            }
            'x' | 'X' | 'o' => {
                let i = value.as_index().ok_or_else(|| {
                    Exception::type_error(format!(
                        "%{} format: an integer is required, not {}",
                        ty,
                        value.type_name()
                    ))
                })?;
                (Value::Int(i), ty)
            }
            other => {
                return Err(Exception::value_error(format!(
                    "unsupported format character '{}'",
                    other
                )))
            }
        };
        spec.ty = Some(code);
        out.push_str(&apply_spec(&value, spec, limit)?);
        check_allocation(out.len(), limit)?;
    }
    if mapping.is_none() && next < items.len() {
        return Err(Exception::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

fn apply_spec(value: &Value, spec: Spec, limit: usize) -> Result<String, Exception> {
    let mut text = String::new();
    if spec.fill != ' ' || spec.align.is_some() {
        text.push(spec.fill);
        text.push(spec.align.unwrap_or('>'));
    }
    if spec.sign != '-' {
        text.push(spec.sign);
    }
    if spec.alternate {
        text.push('#');
    }
    if spec.width > 0 {
        text.push_str(&spec.width.to_string());
    }
    if let Some(p) = spec.precision {
        text.push('.');
        text.push_str(&p.to_string());
    }
    if let Some(ty) = spec.ty {
        text.push(ty);
    }
    format_value(value, &text, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LIMIT: usize = usize::MAX;

    fn fmt(value: Value, spec: &str) -> String {
        format_value(&value, spec, NO_LIMIT).unwrap()
    }

    #[test]
    fn test_numeric_specs() {
        assert_eq!(fmt(Value::Float(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::Int(1234567), ","), "1,234,567");
        assert_eq!(fmt(Value::Float(1234.5), ",.1f"), "1,234.5");
        assert_eq!(fmt(Value::Float(0.256), ".1%"), "25.6%");
        assert_eq!(fmt(Value::Int(42), "05d"), "00042");
        assert_eq!(fmt(Value::Int(-42), "+d"), "-42");
        assert_eq!(fmt(Value::Int(42), "+d"), "+42");
        assert_eq!(fmt(Value::Float(12345.678), "e"), "1.234568e+04");
        assert_eq!(fmt(Value::Float(0.0001234), "g"), "0.0001234");
        assert_eq!(fmt(Value::Float(1234567.0), "g"), "1.23457e+06");
        assert_eq!(fmt(Value::Int(255), "#x"), "0xff");
    }

    #[test]
    fn test_alignment() {
        assert_eq!(fmt(Value::from("ab"), ">5"), "   ab");
        assert_eq!(fmt(Value::from("ab"), "*^6"), "**ab**");
        assert_eq!(fmt(Value::Int(7), "<3"), "7  ");
        assert_eq!(fmt(Value::Int(7), "3"), "  7");
    }

    #[test]
    fn test_bad_code() {
        let err = format_value(&Value::from("x"), "d", NO_LIMIT).unwrap_err();
        assert_eq!(err.message, "Unknown format code 'd' for object of type 'str'");
    }

    #[test]
    fn test_str_format_fields() {
        let mut args = Args::new(vec![Value::from("east"), Value::Float(10.5)]);
        args.keywords.push(("unit".to_string(), Value::from("$")));
        assert_eq!(
            str_format("{} sold {unit}{:.2f} {{ok}}", &args, NO_LIMIT).unwrap(),
            "east sold $10.50 {ok}"
        );
        assert_eq!(str_format("{1}-{0!r}", &args, NO_LIMIT).unwrap(), "10.5-'east'");
        assert!(str_format("{5}", &args, NO_LIMIT).is_err());
    }

    #[test]
    fn test_percent_format() {
        let values = Value::Tuple(vec![Value::from("total"), Value::Float(2.0 / 3.0)]);
        assert_eq!(
            percent_format("%s: %.3f%%", &values, NO_LIMIT).unwrap(),
            "total: 0.667%"
        );
        assert_eq!(percent_format("%5d|", &Value::Int(42), NO_LIMIT).unwrap(), "   42|");
        assert_eq!(percent_format("%-4s|", &Value::from("a"), NO_LIMIT).unwrap(), "a   |");
        let mapping = Value::Dict(vec![(Value::from("n"), Value::Int(3))]);
        assert_eq!(percent_format("%(n)d rows", &mapping, NO_LIMIT).unwrap(), "3 rows");
        let err = percent_format("%s", &Value::Tuple(vec![]), NO_LIMIT).unwrap_err();
        assert_eq!(err.message, "not enough arguments for format string");
        let err = percent_format("x", &Value::Int(1), NO_LIMIT).unwrap_err();
        assert_eq!(
            err.message,
            "not all arguments converted during string formatting"
        );
    }

    #[test]
    fn test_oversized_precision_and_width() {
        let err = format_value(&Value::Float(1.0), ".1000000000f", NO_LIMIT).unwrap_err();
        assert_eq!(err.message, "precision too big");
        let err = format_value(&Value::Int(1), "99999999999999999999999", NO_LIMIT).unwrap_err();
        assert_eq!(err.message, "width too big");
        let err = percent_format("%.1000000000f", &Value::Float(1.0), NO_LIMIT).unwrap_err();
        assert_eq!(err.message, "precision too big");
        let err = percent_format("%3000000000d", &Value::Int(1), NO_LIMIT).unwrap_err();
        assert_eq!(err.message, "width too big");
        assert_eq!(fmt(Value::Float(0.5), ".65535f").len(), 65_537);
        assert_eq!(percent_format("%.f", &Value::Float(2.4), NO_LIMIT).unwrap(), "2");
    }

    #[test]
    fn test_padding_is_charged() {
        let err = format_value(&Value::Int(1), ">150000000", 1 << 20).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);
        let args = Args::new(vec![Value::Int(1)]);
        let err = str_format("{:>150000000}", &args, 1 << 20).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);
        let err = percent_format("%150000000d", &Value::Int(1), 1 << 20).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);
        assert_eq!(format_value(&Value::Int(1), ">5", 1 << 20).unwrap(), "    1");
    }
}
