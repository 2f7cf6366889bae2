//! Command-line spelling of OSC arguments.
//!
//! `i:1 h:-3 f:2.5 d:0.1 s:text S:sym c:x b:0aff r:ff0000ff T F N I`.
//! Untagged values are read as int, then float, then string.

use anyhow::{Context, Result, anyhow, bail};
use lxosc_core::{OscArgument, OscColor};

pub fn parse_argument(raw: &str) -> Result<OscArgument> {
    match raw {
        "T" => return Ok(OscArgument::Bool(true)),
        "F" => return Ok(OscArgument::Bool(false)),
        "N" => return Ok(OscArgument::Nil),
        "I" => return Ok(OscArgument::Infinitum),
        _ => {}
    }

    let Some((tag, value)) = raw.split_once(':').filter(|(tag, _)| tag.len() == 1) else {
        return Ok(untagged(raw));
    };

    let arg = match tag {
        "i" => OscArgument::Int(value.parse().with_context(|| format!("bad int32 {value:?}"))?),
        "h" => OscArgument::Long(value.parse().with_context(|| format!("bad int64 {value:?}"))?),
        "f" => OscArgument::Float(value.parse().with_context(|| format!("bad float32 {value:?}"))?),
        "d" => OscArgument::Double(value.parse().with_context(|| format!("bad double {value:?}"))?),
        "s" => OscArgument::Str(value.to_string()),
        "S" => OscArgument::Symbol(value.to_string()),
        "c" => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => OscArgument::Char(c),
                _ => bail!("char argument needs exactly one character, got {value:?}"),
            }
        }
        "b" => OscArgument::Blob(parse_hex(value)?),
        "r" => {
            let rgba = u32::from_str_radix(value, 16)
                .with_context(|| format!("bad rgba {value:?}"))?;
            OscArgument::Color(OscColor::from_u32(rgba))
        }
        // Not a known tag, so the colon belongs to a plain string.
        _ => untagged(raw),
    };
    Ok(arg)
}

fn untagged(raw: &str) -> OscArgument {
    if let Ok(i) = raw.parse::<i32>() {
        OscArgument::Int(i)
    } else if let Ok(f) = raw.parse::<f32>() {
        OscArgument::Float(f)
    } else {
        OscArgument::Str(raw.to_string())
    }
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    if value.len() % 2 != 0 {
        bail!("blob hex {value:?} has an odd number of digits");
    }
    (0..value.len())
        .step_by(2)
        .map(|i| {
            value
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow!("bad blob hex {value:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_values() {
        assert_eq!(parse_argument("i:1").unwrap(), OscArgument::Int(1));
        assert_eq!(parse_argument("h:-3").unwrap(), OscArgument::Long(-3));
        assert_eq!(parse_argument("f:2.5").unwrap(), OscArgument::Float(2.5));
        assert_eq!(parse_argument("d:0.5").unwrap(), OscArgument::Double(0.5));
        assert_eq!(parse_argument("s:text").unwrap(), OscArgument::Str("text".into()));
        assert_eq!(parse_argument("S:sym").unwrap(), OscArgument::Symbol("sym".into()));
        assert_eq!(parse_argument("c:x").unwrap(), OscArgument::Char('x'));
        assert_eq!(parse_argument("b:0aff").unwrap(), OscArgument::Blob(vec![0x0a, 0xff]));
        assert_eq!(
            parse_argument("r:ff000080").unwrap(),
            OscArgument::Color(OscColor::new(0xff, 0, 0, 0x80))
        );
    }

    #[test]
    fn bare_flags_and_untagged_values() {
        assert_eq!(parse_argument("T").unwrap(), OscArgument::Bool(true));
        assert_eq!(parse_argument("F").unwrap(), OscArgument::Bool(false));
        assert_eq!(parse_argument("N").unwrap(), OscArgument::Nil);
        assert_eq!(parse_argument("I").unwrap(), OscArgument::Infinitum);
        assert_eq!(parse_argument("7").unwrap(), OscArgument::Int(7));
        assert_eq!(parse_argument("0.75").unwrap(), OscArgument::Float(0.75));
        assert_eq!(parse_argument("hello").unwrap(), OscArgument::Str("hello".into()));
        assert_eq!(
            parse_argument("http://x").unwrap(),
            OscArgument::Str("http://x".into())
        );
        assert_eq!(parse_argument("s:a:b").unwrap(), OscArgument::Str("a:b".into()));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(parse_argument("i:one").is_err());
        assert!(parse_argument("f:").is_err());
        assert!(parse_argument("c:ab").is_err());
        assert!(parse_argument("b:abc").is_err());
        assert!(parse_argument("b:zz").is_err());
    }
}
