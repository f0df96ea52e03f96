//! Type name translation between the two generic naming grammars.
//!
//! Snapshot metadata reports generic types in *angle* form, while local type
//! catalogs register them in *bracket* form:
//!
//! | angle form                          | bracket form                                 |
//! |-------------------------------------|----------------------------------------------|
//! | `System.Int32`                      | `System.Int32`                               |
//! | `List<System.Int32>`                | ``List`1[[System.Int32]]``                   |
//! | `Dictionary<K,List<V>>`             | ``Dictionary`2[[K],[List`1[[V]]]]``          |
//! | `Outer<A>+Inner<B>[]`               | ``Outer`1+Inner`1[[A],[B]][]``               |
//! | `Dictionary<,>`                     | ``Dictionary`2``                             |
//!
//! Nested-type `+` separators and trailing array suffixes (`[]`, `[,]`) are
//! kept as-is, which makes [`to_bracket_form`] and [`to_angle_form`] exact
//! inverses on well-formed names. Unbound parameters (`Foo<,>`) carry no
//! argument list in bracket form.
//!
//! Both functions are total: a name that does not parse under the grammar
//! is returned unchanged.

use std::fmt::Write as _;

use smallvec::SmallVec;
use tracing::trace;

type Parts<'a> = SmallVec<[&'a str; 4]>;

/// Convert an angle-bracket generic name into backtick/bracket form.
///
/// ```rust
/// use heapnav_core::names::to_bracket_form;
///
/// assert_eq!(
///     to_bracket_form("System.Collections.Generic.Dictionary<System.Int32,System.String>"),
///     "System.Collections.Generic.Dictionary`2[[System.Int32],[System.String]]"
/// );
/// assert_eq!(to_bracket_form("System.Int32[]"), "System.Int32[]");
/// ```
pub fn to_bracket_form(name: &str) -> String
{
    if !name.contains('<') {
        return name.to_string();
    }
    try_to_bracket_form(name).unwrap_or_else(|| {
        trace!(name, "malformed angle-form type name left unchanged");
        name.to_string()
    })
}

/// Convert a backtick/bracket generic name into angle-bracket form.
///
/// Assembly qualifiers inside bracketed arguments (`[System.Int32, mscorlib]`)
/// are dropped.
///
/// ```rust
/// use heapnav_core::names::to_angle_form;
///
/// assert_eq!(
///     to_angle_form("System.Collections.Generic.List`1[[System.String, mscorlib]][]"),
///     "System.Collections.Generic.List<System.String>[]"
/// );
/// ```
pub fn to_angle_form(name: &str) -> String
{
    if !name.contains('`') {
        return name.to_string();
    }
    try_to_angle_form(name).unwrap_or_else(|| {
        trace!(name, "malformed bracket-form type name left unchanged");
        name.to_string()
    })
}

/// Whether a runtime (angle form) name denotes the same type as a local (bracket form) one.
///
/// Either side may already be in the other grammar; plain equality is checked first.
pub fn names_match(runtime: &str, local: &str) -> bool
{
    runtime == local || to_bracket_form(runtime) == local || to_angle_form(local) == runtime
}

fn try_to_bracket_form(name: &str) -> Option<String>
{
    let (body, suffix) = split_array_suffix(name);
    let mut out = String::with_capacity(name.len() + 8);
    let mut args: Vec<String> = Vec::new();
    let mut bound = false;

    for (index, segment) in split_top_level(body, '+')?.into_iter().enumerate() {
        if index > 0 {
            out.push('+');
        }
        let Some(open) = segment.find('<') else {
            out.push_str(segment);
            continue;
        };
        let inner = segment[open + 1..].strip_suffix('>')?;
        let segment_args = split_top_level(inner, ',')?;
        out.push_str(&segment[..open]);
        let _ = write!(out, "`{}", segment_args.len());
        for arg in segment_args {
            bound |= !arg.is_empty();
            args.push(try_to_bracket_form_arg(arg)?);
        }
    }

    if bound {
        out.push('[');
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push('[');
            out.push_str(arg);
            out.push(']');
        }
        out.push(']');
    }
    out.push_str(suffix);
    Some(out)
}

fn try_to_bracket_form_arg(arg: &str) -> Option<String>
{
    if arg.contains('<') {
        try_to_bracket_form(arg)
    } else {
        Some(arg.to_string())
    }
}

fn try_to_angle_form(name: &str) -> Option<String>
{
    let (prefix, rest) = name.split_at(name.find('[').unwrap_or(name.len()));
    let (args, suffix) = if rest.starts_with("[[") {
        split_argument_list(rest)?
    } else {
        (Parts::new(), rest)
    };
    if !is_array_suffix(suffix) {
        return None;
    }

    let explicit = !args.is_empty();
    let mut remaining = args.into_iter();
    let mut out = String::with_capacity(name.len());

    for (index, segment) in prefix.split('+').enumerate() {
        if index > 0 {
            out.push('+');
        }
        let Some((base, arity)) = segment.split_once('`') else {
            out.push_str(segment);
            continue;
        };
        if arity.is_empty() || !arity.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let arity: usize = arity.parse().ok()?;
        out.push_str(base);
        out.push('<');
        for position in 0..arity {
            if position > 0 {
                out.push(',');
            }
            if explicit {
                let arg = strip_assembly_qualifier(remaining.next()?);
                if arg.contains('`') {
                    out.push_str(&try_to_angle_form(arg)?);
                } else {
                    out.push_str(arg);
                }
            }
        }
        out.push('>');
    }

    if remaining.next().is_some() {
        return None;
    }
    out.push_str(suffix);
    Some(out)
}

/// Split on `separator` wherever it occurs outside `<...>` and `[...]`.
///
/// Returns `None` when the brackets are unbalanced.
fn split_top_level(text: &str, separator: char) -> Option<Parts<'_>>
{
    let mut parts = Parts::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth = depth.checked_sub(1)?,
            c if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

/// Parse `[[A],[B],...]` at the start of `text`, returning the arguments and what follows.
fn split_argument_list(text: &str) -> Option<(Parts<'_>, &str)>
{
    let mut args = Parts::new();
    let mut depth = 0usize;
    let mut arg_start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '[' => {
                depth += 1;
                if depth == 2 {
                    arg_start = index + 1;
                }
            }
            ']' => {
                if depth == 2 {
                    args.push(&text[arg_start..index]);
                }
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some((args, &text[index + 1..]));
                }
            }
            ',' | ' ' if depth == 1 => {}
            _ if depth == 1 => return None,
            _ => {}
        }
    }
    None
}

/// Drop `, Assembly, Version=...` from a bracketed argument.
fn strip_assembly_qualifier(arg: &str) -> &str
{
    let mut depth = 0usize;
    for (index, c) in arg.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return arg[..index].trim_end(),
            _ => {}
        }
    }
    arg
}

/// Split a trailing `[]` / `[,]` / `[][]` run off an angle-form name.
fn split_array_suffix(name: &str) -> (&str, &str)
{
    let body = name.trim_end_matches(['[', ']', ',']);
    name.split_at(body.len())
}

fn is_array_suffix(text: &str) -> bool
{
    text.chars().all(|c| matches!(c, '[' | ']' | ','))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_split_top_level_respects_nesting()
    {
        let parts = split_top_level("A,B<C,D>,E[,]", ',').unwrap();
        assert_eq!(parts.as_slice(), &["A", "B<C,D>", "E[,]"]);
        assert!(split_top_level("A<B", ',').is_none());
        assert!(split_top_level("A>B", ',').is_none());
    }

    #[test]
    fn test_split_argument_list()
    {
        let (args, rest) = split_argument_list("[[A],[B`1[[C]]]][]").unwrap();
        assert_eq!(args.as_slice(), &["A", "B`1[[C]]"]);
        assert_eq!(rest, "[]");
        assert!(split_argument_list("[[A]").is_none());
        assert!(split_argument_list("[[A]x[B]]").is_none());
    }

    #[test]
    fn test_strip_assembly_qualifier()
    {
        assert_eq!(strip_assembly_qualifier("System.Int32, mscorlib, Version=4.0.0.0"), "System.Int32");
        assert_eq!(
            strip_assembly_qualifier("List`1[[System.Int32, mscorlib]], mscorlib"),
            "List`1[[System.Int32, mscorlib]]"
        );
        assert_eq!(strip_assembly_qualifier("System.Int32[,]"), "System.Int32[,]");
    }

    #[test]
    fn test_split_array_suffix()
    {
        assert_eq!(split_array_suffix("Foo<A>[,][]"), ("Foo<A>", "[,][]"));
        assert_eq!(split_array_suffix("Foo<A[]>"), ("Foo<A[]>", ""));
    }

    #[test]
    fn test_malformed_names_pass_through()
    {
        assert_eq!(to_bracket_form("Foo<A"), "Foo<A");
        assert_eq!(to_bracket_form("Foo<A>Bar"), "Foo<A>Bar");
        assert_eq!(to_angle_form("Foo`x[[A]]"), "Foo`x[[A]]");
        assert_eq!(to_angle_form("Foo`1[[A],[B]]"), "Foo`1[[A],[B]]");
        assert_eq!(to_angle_form("Foo`2[[A]]"), "Foo`2[[A]]");
    }
}
