use std::cmp::Ordering;
use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::errors::{FabricError, Result};

/// Compare two strings the way a human reads interface and host names:
/// digit runs compare numerically, everything else lexically.
/// "swp2" < "swp10", "leaf9" < "leaf10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (is_digits(x), is_digits(y)) {
                    (true, true) => cmp_digits(x, y),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Sort a list of names in place using [`natural_cmp`]
pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

/// Name ordered by [`natural_cmp`], for sorted sets and maps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey(pub String);

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

// Digit runs of any length, without overflowing an integer type.
fn cmp_digits(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// Split into alternating runs of digits and non-digits
fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digit)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

/// Parse one token into (name, start, end).
/// Accepts `swp1` and `swp1-4`; the name is everything before the index.
fn parse_token(token: &str) -> Result<(String, u32, u32)> {
    let invalid = || FabricError::InvalidRange(token.to_string());

    let (head, end) = match token.rsplit_once('-') {
        Some((head, tail))
            if !tail.is_empty()
                && is_digits(tail)
                && head.ends_with(|c: char| c.is_ascii_digit()) =>
        {
            (head, Some(tail.parse::<u32>().map_err(|_| invalid())?))
        }
        _ => (token, None),
    };

    let name_len = head.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, digits) = head.split_at(name_len);
    if digits.is_empty() {
        return Err(invalid());
    }

    let start: u32 = digits.parse().map_err(|_| invalid())?;
    let end = end.unwrap_or(start);
    if end < start {
        return Err(invalid());
    }

    Ok((name.to_string(), start, end))
}

fn split_list(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decode a comma separated range string such as `swp1-4,swp10` into
/// `(name, index)` pairs in natural order.
pub fn decode(text: &str) -> Result<Vec<(String, u32)>> {
    decode_items(&split_list(text))
}

/// Decode a list of tokens, each either `name{n}` or `name{a}-{b}`.
pub fn decode_items<S: AsRef<str>>(items: &[S]) -> Result<Vec<(String, u32)>> {
    let mut out = Vec::new();
    for item in items {
        let (name, start, end) = parse_token(item.as_ref().trim())?;
        out.extend((start..=end).map(|n| (name.clone(), n)));
    }

    out.sort_by_cached_key(|pair| NaturalKey(render(pair)));
    Ok(out)
}

/// Decode a range string and render every member, e.g. `swp1-3` ->
/// `["swp1", "swp2", "swp3"]`.
pub fn expand(text: &str) -> Result<Vec<String>> {
    Ok(decode(text)?.iter().map(render).collect())
}

fn render((name, index): &(String, u32)) -> String {
    format!("{}{}", name, index)
}

/// Encode tokens into compact range notation.
///
/// Consecutive indexes of the same name collapse into `name{min}-{max}`.
/// With `group_by_name`, every token of one name is joined into a single
/// string: `["vni100", "vni200-201"]` -> `["vni100,200-201"]`.
pub fn encode<S: AsRef<str>>(items: &[S], group_by_name: bool) -> Result<Vec<String>> {
    let decoded = decode_items(items)?;

    let mut by_name: IndexMap<String, BTreeSet<u32>> = IndexMap::new();
    for (name, index) in decoded {
        by_name.entry(name).or_default().insert(index);
    }

    // (name, rendered indexes) so grouping never has to re-split a token
    let mut runs: Vec<(String, String)> = Vec::new();
    for (name, indexes) in &by_name {
        let mut iter = indexes.iter().copied();
        let Some(first) = iter.next() else { continue };
        let (mut start, mut prev) = (first, first);
        for n in iter {
            if n != prev + 1 {
                runs.push((name.clone(), render_run(start, prev)));
                start = n;
            }
            prev = n;
        }
        runs.push((name.clone(), render_run(start, prev)));
    }
    runs.sort_by_cached_key(|(name, run)| NaturalKey(format!("{}{}", name, run)));

    if !group_by_name {
        return Ok(runs.into_iter().map(|(name, run)| name + &run).collect());
    }

    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, run) in runs {
        grouped.entry(name).or_default().push(run);
    }
    Ok(grouped
        .into_iter()
        .map(|(name, runs)| format!("{}{}", name, runs.join(",")))
        .collect())
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

/// Build a range token of `count` members starting at `base`:
/// `("swp1", 4)` -> `"swp1-4"`.
pub fn span(base: &str, count: usize) -> Result<String> {
    let (name, start, end) = parse_token(base)?;
    if start != end {
        return Err(FabricError::InvalidRange(base.to_string()));
    }
    let count = u32::try_from(count.max(1)).map_err(|_| FabricError::InvalidRange(base.to_string()))?;
    let end = start
        .checked_add(count - 1)
        .ok_or_else(|| FabricError::InvalidRange(base.to_string()))?;
    Ok(format!("{}{}-{}", name, start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(v: &[(&str, u32)]) -> Vec<(String, u32)> {
        v.iter().map(|(n, i)| (n.to_string(), *i)).collect()
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("swp2", "swp10"), Ordering::Less);
        assert_eq!(natural_cmp("leaf10", "leaf9"), Ordering::Greater);
        assert_eq!(natural_cmp("swp1", "swp1"), Ordering::Equal);
        assert_eq!(natural_cmp("eth0", "swp1"), Ordering::Less);
        assert_eq!(natural_cmp("swp1", "swp1.100"), Ordering::Less);

        let mut hosts = vec!["leaf10", "leaf2", "leaf1"];
        natural_sort(&mut hosts);
        assert_eq!(hosts, vec!["leaf1", "leaf2", "leaf10"]);

        let set: std::collections::BTreeSet<NaturalKey> =
            ["swp10", "swp2", "swp1"].iter().map(|s| NaturalKey(s.to_string())).collect();
        let ordered: Vec<&str> = set.iter().map(|k| k.0.as_str()).collect();
        assert_eq!(ordered, vec!["swp1", "swp2", "swp10"]);
    }

    #[test]
    fn test_decode_ranges() {
        assert_eq!(
            decode("swp10, swp1-3").unwrap(),
            pairs(&[("swp", 1), ("swp", 2), ("swp", 3), ("swp", 10)])
        );
        assert_eq!(decode("100,200").unwrap(), pairs(&[("", 100), ("", 200)]));
        assert_eq!(decode("swp5-5").unwrap(), pairs(&[("swp", 5)]));
    }

    #[test]
    fn test_decode_rejects_tokens_without_index() {
        assert!(matches!(decode("swp"), Err(FabricError::InvalidRange(t)) if t == "swp"));
        assert!(matches!(decode("swp4-1"), Err(FabricError::InvalidRange(_))));
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand("swp23-24").unwrap(), vec!["swp23", "swp24"]);
        assert_eq!(expand("swp2,swp1").unwrap(), vec!["swp1", "swp2"]);
    }

    #[test]
    fn test_encode_clusters_consecutive_indexes() {
        let items = ["swp1", "swp2", "swp4", "swp5", "swp10-11"];
        assert_eq!(encode(&items, false).unwrap(), vec!["swp1-2", "swp4-5", "swp10-11"]);
        assert_eq!(encode(&["100", "4000"], false).unwrap(), vec!["100", "4000"]);
        assert_eq!(encode(&["swp1", "swp1"], false).unwrap(), vec!["swp1"]);
    }

    #[test]
    fn test_encode_group_by_name() {
        let items = ["vni100", "vni4000", "vni4001", "vni200"];
        assert_eq!(encode(&items, true).unwrap(), vec!["vni100,200,4000-4001"]);

        let mixed = ["swp1", "eth0", "swp2"];
        assert_eq!(encode(&mixed, true).unwrap(), vec!["eth0", "swp1-2"]);
    }

    #[test]
    fn test_round_trip_as_set() {
        for input in ["swp1-4,swp10", "swp3,swp1,swp2", "100,101,103", "eth0,swp1-2,swp2"] {
            let first: BTreeSet<_> = decode(input).unwrap().into_iter().collect();
            let encoded = encode(&split_list(input), false).unwrap();
            let second: BTreeSet<_> = decode_items(&encoded).unwrap().into_iter().collect();
            assert_eq!(first, second, "round trip of {}", input);
        }
    }

    #[test]
    fn test_span() {
        assert_eq!(span("swp1", 4).unwrap(), "swp1-4");
        assert_eq!(span("swp21", 1).unwrap(), "swp21-21");
        assert!(span("swp1-2", 2).is_err());
        assert_eq!(span("swp4294967295", 1).unwrap(), "swp4294967295-4294967295");
        assert!(matches!(span("swp4294967295", 2), Err(FabricError::InvalidRange(_))));
    }
}
