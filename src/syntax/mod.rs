//! Stringified names and `corbaname` URLs.
//!
//! String form: components separated by `/`, each component `id.kind`
//! (`id` alone when the kind is empty, `.kind` when the id is empty, `.`
//! when both are). A backslash escapes the next character, so `/`, `.` and
//! `\` can appear inside ids and kinds.

use crate::model::{CompoundName, NameAtom};
use crate::{Error, Result};

const URL_SCHEME: &str = "corbaname:";

/// Characters a `corbaname` fragment may carry unescaped besides ASCII
/// alphanumerics.
const URL_UNRESERVED: &[u8] = b";/:?@&=+$,-_.!~*'()";

/// Render `name` in string form.
pub fn to_string(name: &CompoundName) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidName);
    }
    let mut out = String::new();
    for (i, atom) in name.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        if atom.is_empty() {
            out.push('.');
            continue;
        }
        escape_into(&atom.id, &mut out);
        if !atom.kind.is_empty() {
            out.push('.');
            escape_into(&atom.kind, &mut out);
        }
    }
    Ok(out)
}

fn escape_into(part: &str, out: &mut String) {
    for c in part.chars() {
        if matches!(c, '/' | '.' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Parse the string form back into a compound name.
pub fn to_name(sn: &str) -> Result<CompoundName> {
    if sn.is_empty() {
        return Err(Error::InvalidName);
    }

    let mut name = CompoundName::new();
    let mut id = String::new();
    let mut kind = String::new();
    let mut in_kind = false;
    let mut component_len = 0usize;
    let mut chars = sn.chars();

    while let Some(c) = chars.next() {
        match c {
            '/' => {
                if component_len == 0 {
                    return Err(Error::InvalidName);
                }
                name.push(NameAtom::new(std::mem::take(&mut id), std::mem::take(&mut kind)));
                in_kind = false;
                component_len = 0;
                continue;
            }
            '.' => {
                if in_kind {
                    return Err(Error::InvalidName);
                }
                in_kind = true;
            }
            '\\' => {
                let escaped = chars.next().ok_or(Error::InvalidName)?;
                if in_kind { kind.push(escaped) } else { id.push(escaped) }
            }
            other => {
                if in_kind { kind.push(other) } else { id.push(other) }
            }
        }
        component_len += 1;
    }

    if component_len == 0 {
        return Err(Error::InvalidName);
    }
    name.push(NameAtom::new(id, kind));
    Ok(name)
}

/// Build `corbaname:<address>#<escaped sn>`.
///
/// `sn` must be a valid string name; it is escaped byte-wise so the URL
/// stays ASCII.
pub fn to_url(address: &str, sn: &str) -> Result<String> {
    if address.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    to_name(sn)?;

    let mut url = String::with_capacity(URL_SCHEME.len() + address.len() + 1 + sn.len());
    url.push_str(URL_SCHEME);
    url.push_str(address);
    url.push('#');
    for &b in sn.as_bytes() {
        if b.is_ascii_alphanumeric() || URL_UNRESERVED.contains(&b) {
            url.push(b as char);
        } else {
            url.push_str(&format!("%{b:02X}"));
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_string_forms() {
        let name: CompoundName = vec![
            NameAtom::new("a", "b"),
            NameAtom::id("c"),
            NameAtom::new("", "k"),
            NameAtom::empty(),
        ]
        .into();
        assert_eq!(to_string(&name).unwrap(), "a.b/c/.k/.");
    }

    #[test]
    fn test_to_string_escapes() {
        let name: CompoundName = vec![NameAtom::new("x/y", "v1.0"), NameAtom::id(r"back\slash")].into();
        assert_eq!(to_string(&name).unwrap(), r"x\/y.v1\.0/back\\slash");
    }

    #[test]
    fn test_to_name() {
        let name = to_name(r"a.b/c/.k/./x\/y.v1\.0").unwrap();
        let expected: CompoundName = vec![
            NameAtom::new("a", "b"),
            NameAtom::id("c"),
            NameAtom::new("", "k"),
            NameAtom::empty(),
            NameAtom::new("x/y", "v1.0"),
        ]
        .into();
        assert_eq!(name, expected);
    }

    #[test]
    fn test_string_roundtrip() {
        let name: CompoundName = vec![NameAtom::new("dev", "ctx"), NameAtom::new("p.q", ""), NameAtom::new("", "only")].into();
        assert_eq!(to_name(&to_string(&name).unwrap()).unwrap(), name);
    }

    #[test]
    fn test_to_name_invalid() {
        for bad in ["", "/", "a/", "/a", "a//b", "a.b.c", r"a\"] {
            assert!(matches!(to_name(bad), Err(Error::InvalidName)), "{bad:?} should be invalid");
        }
        assert!(matches!(to_string(&CompoundName::new()), Err(Error::InvalidName)));
    }

    #[test]
    fn test_to_url() {
        assert_eq!(
            to_url("myhost.example.com:2809", "a.b/c d").unwrap(),
            "corbaname:myhost.example.com:2809#a.b/c%20d"
        );
        assert_eq!(to_url(":host", "x<y>").unwrap(), "corbaname::host#x%3Cy%3E");
        assert_eq!(to_url("h", "caf\u{e9}").unwrap(), "corbaname:h#caf%C3%A9");
    }

    #[test]
    fn test_to_url_errors() {
        assert!(matches!(to_url("", "a"), Err(Error::InvalidAddress(_))));
        assert!(matches!(to_url("h", ""), Err(Error::InvalidName)));
        assert!(matches!(to_url("h", "a//b"), Err(Error::InvalidName)));
    }
}
